//! In-process transport that records every request.
//!
//! Primarily intended for testing and offline demos: failures can be toggled
//! to simulate a flaky collector, and `GET` responses are canned per path.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::Transport;
use crate::{Error, Result};

/// How a request was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Awaited `GET`
    Get,
    /// Awaited `POST`
    Post,
    /// Fire-and-forget beacon
    Beacon,
}

/// A request seen by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Delivery mode
    pub kind: RequestKind,
    /// Request path
    pub path: String,
    /// JSON body (`None` for `GET`)
    pub body: Option<serde_json::Value>,
}

/// Transport double with scriptable failures.
///
/// Only successful deliveries are recorded; failed attempts increment
/// [`Self::failed_attempts`].
#[derive(Debug)]
pub struct RecordingTransport {
    delivered: Mutex<Vec<RecordedRequest>>,
    responses: DashMap<String, serde_json::Value>,
    failing: AtomicBool,
    beacon_accepts: AtomicBool,
    failed: Mutex<usize>,
}

impl RecordingTransport {
    /// A transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            responses: DashMap::new(),
            failing: AtomicBool::new(false),
            beacon_accepts: AtomicBool::new(true),
            failed: Mutex::new(0),
        }
    }

    /// Make `get_json`/`post_json` fail (simulated network error).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `beacon` refuse payloads.
    pub fn set_beacon_accepts(&self, accepts: bool) {
        self.beacon_accepts.store(accepts, Ordering::SeqCst);
    }

    /// Canned body for `GET path`.
    pub fn respond_with(&self, path: impl Into<String>, body: serde_json::Value) {
        self.responses.insert(path.into(), body);
    }

    /// All successfully delivered requests, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.delivered.lock().clone()
    }

    /// Bodies delivered to `path` by `POST` or beacon.
    #[must_use]
    pub fn bodies_for(&self, path: &str) -> Vec<serde_json::Value> {
        self.delivered
            .lock()
            .iter()
            .filter(|r| r.path == path && r.kind != RequestKind::Get)
            .filter_map(|r| r.body.clone())
            .collect()
    }

    /// Event names delivered to `path`, flattened across batches.
    #[must_use]
    pub fn event_names(&self, path: &str) -> Vec<String> {
        self.bodies_for(path)
            .iter()
            .filter_map(|body| body.get("events").and_then(|e| e.as_array()).cloned())
            .flatten()
            .filter_map(|event| event.get("name").and_then(|n| n.as_str()).map(String::from))
            .collect()
    }

    /// Number of delivery attempts that were failed on purpose.
    #[must_use]
    pub fn failed_attempts(&self) -> usize {
        *self.failed.lock()
    }

    /// Forget recorded requests.
    pub fn clear(&self) {
        self.delivered.lock().clear();
        *self.failed.lock() = 0;
    }

    fn record(&self, kind: RequestKind, path: &str, body: Option<serde_json::Value>) {
        self.delivered.lock().push(RecordedRequest {
            kind,
            path: path.to_string(),
            body,
        });
    }

    fn check_network(&self, path: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            *self.failed.lock() += 1;
            return Err(Error::Transport(format!("simulated network failure for {path}")));
        }
        Ok(())
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for RecordingTransport {
    async fn get_json(&self, path: &str, _headers: &[(&str, &str)]) -> Result<serde_json::Value> {
        self.check_network(path)?;
        let body = self
            .responses
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Transport(format!("404 for {path}")))?;
        self.record(RequestKind::Get, path, None);
        Ok(body)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<()> {
        self.check_network(path)?;
        self.record(RequestKind::Post, path, Some(body));
        Ok(())
    }

    fn beacon(&self, path: &str, body: serde_json::Value) -> bool {
        if !self.beacon_accepts.load(Ordering::SeqCst) {
            *self.failed.lock() += 1;
            return false;
        }
        self.record(RequestKind::Beacon, path, Some(body));
        true
    }
}
