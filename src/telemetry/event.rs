//! Telemetry event type and priority classification.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event names that flush the queue immediately.
pub const DEFAULT_HIGH_PRIORITY: &[&str] = &[
    "conversion",
    "experiment_conversion",
    "error",
    "form_submission",
    "cta_click",
];

/// Delivery urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Batched with everything else.
    #[default]
    Normal,
    /// Triggers an immediate flush.
    High,
}

/// A behavioural event.
///
/// Priority is assigned by the queue from the event name; whatever a caller
/// sets is overwritten on enqueue. The id is fixed at creation and identifies
/// copies of the same event across retries and the offline buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    name: String,
    #[serde(default)]
    audience: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default)]
    payload: serde_json::Value,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    priority: Priority,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            audience: String::new(),
            section: None,
            action: None,
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
            priority: Priority::Normal,
        }
    }

    /// Set the audience scope.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Set the page section label.
    #[must_use]
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Set the action label.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attach a structured payload.
    #[must_use]
    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Override the client timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Get the event id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Get the event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the audience (empty if unset).
    #[must_use]
    pub fn audience_scope(&self) -> &str {
        &self.audience
    }

    /// Get the section label.
    #[must_use]
    pub fn section_label(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// Get the action label.
    #[must_use]
    pub fn action_label(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Get the payload.
    #[must_use]
    pub const fn payload_value(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Get the client timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the assigned priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub(crate) fn fill_audience(&mut self, audience: &str) {
        if self.audience.is_empty() {
            self.audience = audience.to_string();
        }
    }
}

/// Static name → priority table.
#[derive(Debug, Clone)]
pub struct PriorityTable {
    high: FxHashSet<String>,
}

impl PriorityTable {
    /// Table marking exactly `names` as high priority.
    #[must_use]
    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            high: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Priority for an event name.
    #[must_use]
    pub fn classify(&self, name: &str) -> Priority {
        if self.high.contains(name) {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_PRIORITY.iter().copied())
    }
}
