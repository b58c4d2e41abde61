//! Ordered in-memory event buffer.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use super::event::{Event, PriorityTable};
use super::Priority;

/// FIFO of pending events. Not synchronised; the dispatcher owns the lock.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
    priorities: PriorityTable,
}

impl EventQueue {
    /// Empty queue classifying with `priorities`.
    #[must_use]
    pub fn new(priorities: PriorityTable) -> Self {
        Self {
            events: VecDeque::new(),
            priorities,
        }
    }

    /// Tag the event's priority and append it. Returns the priority.
    pub fn push(&mut self, mut event: Event) -> Priority {
        let priority = self.priorities.classify(event.name());
        event.set_priority(priority);
        self.events.push_back(event);
        priority
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Snapshot and clear: everything pending, in enqueue order.
    pub fn take_all(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Put a batch back ahead of anything enqueued since it was taken.
    ///
    /// Events whose id is already queued are skipped. Returns how many were
    /// put back.
    pub fn requeue_front(&mut self, batch: Vec<Event>) -> usize {
        let mut seen: FxHashSet<_> = self.events.iter().map(Event::id).collect();
        let fresh: Vec<Event> = batch.into_iter().filter(|e| seen.insert(e.id())).collect();
        let count = fresh.len();
        for event in fresh.into_iter().rev() {
            self.events.push_front(event);
        }
        count
    }

    /// Pending events without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(queue: &EventQueue) -> Vec<&str> {
        queue.iter().map(Event::name).collect()
    }

    #[test]
    fn test_push_tags_priority() {
        let mut queue = EventQueue::default();
        assert_eq!(queue.push(Event::new("page_view")), Priority::Normal);
        assert_eq!(queue.push(Event::new("conversion")), Priority::High);
        assert_eq!(queue.iter().nth(1).unwrap().priority(), Priority::High);
    }

    #[test]
    fn test_take_all_clears_in_order() {
        let mut queue = EventQueue::default();
        queue.push(Event::new("a"));
        queue.push(Event::new("b"));

        let batch = queue.take_all();

        assert_eq!(batch.iter().map(Event::name).collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_front_preserves_relative_order() {
        let mut queue = EventQueue::default();
        queue.push(Event::new("a"));
        queue.push(Event::new("b"));
        let batch = queue.take_all();

        queue.push(Event::new("c"));
        queue.requeue_front(batch);

        assert_eq!(names(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_requeue_front_skips_events_already_queued() {
        let mut queue = EventQueue::default();
        queue.push(Event::new("a"));
        let batch = queue.take_all();
        let copy = batch.clone();

        assert_eq!(queue.requeue_front(batch), 1);
        assert_eq!(queue.requeue_front(copy), 0);

        assert_eq!(names(&queue), vec!["a"]);
    }
}
