//! Tracker and dispatcher configuration.
//!
//! Every field has a default, so a config file only needs the overrides:
//!
//! ```rust
//! use abtrack::config::TrackerConfig;
//!
//! let config = TrackerConfig::from_json(r#"{
//!     "userId": "alumni-1042",
//!     "audience": "alumni",
//!     "dispatcher": { "batchSize": 20, "flushIntervalMs": 10000 }
//! }"#)?;
//!
//! assert_eq!(config.dispatcher.batch_size, 20);
//! assert!(!config.session_id.is_empty());
//! # Ok::<(), abtrack::Error>(())
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assignment::Identity;
use crate::telemetry::{PriorityTable, DEFAULT_HIGH_PRIORITY, DEFAULT_OFFLINE_CAPACITY};
use crate::transport::paths;
use crate::{Error, Result};

/// Batching and retry knobs for the [`BatchDispatcher`](crate::telemetry::BatchDispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherConfig {
    /// Flush once this many events are pending
    pub batch_size: usize,
    /// Timer flush period in milliseconds (5000 for interactive pages, 10000 for low-traffic collectors)
    pub flush_interval_ms: u64,
    /// Offline buffer capacity; oldest events are dropped past it
    pub offline_capacity: usize,
    /// Event names that trigger an immediate flush
    pub high_priority: Vec<String>,
    /// Collector path for event batches
    pub events_path: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval_ms: 5_000,
            offline_capacity: DEFAULT_OFFLINE_CAPACITY,
            high_priority: DEFAULT_HIGH_PRIORITY.iter().map(|s| (*s).to_string()).collect(),
            events_path: paths::EVENTS.to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Timer flush period.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Priority table built from `high_priority`.
    #[must_use]
    pub fn priority_table(&self) -> PriorityTable {
        PriorityTable::new(self.high_priority.iter().cloned())
    }

    /// Set the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the timer period.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the offline buffer capacity.
    #[must_use]
    pub const fn with_offline_capacity(mut self, capacity: usize) -> Self {
        self.offline_capacity = capacity;
        self
    }

    /// Check the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero batch size, interval, or capacity.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batchSize must be at least 1".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::InvalidInput("flushIntervalMs must be positive".into()));
        }
        if self.offline_capacity == 0 {
            return Err(Error::InvalidInput("offlineCapacity must be at least 1".into()));
        }
        if !self.events_path.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "eventsPath must start with '/', got '{}'",
                self.events_path
            )));
        }
        Ok(())
    }
}

/// Per-instance tracker configuration (identity, audience, batching).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    /// Stable user id, when signed in
    pub user_id: Option<String>,
    /// Session id; a random v4 UUID when omitted
    pub session_id: String,
    /// Audience scope sent with every event and experiment request
    pub audience: String,
    /// Fetch `GET /experiments/active` during `init()`
    pub load_experiments_on_init: bool,
    /// Batching and retry
    pub dispatcher: DispatcherConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            audience: String::new(),
            load_experiments_on_init: true,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Defaults with an explicit session id.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns error on malformed JSON or invalid values.
    pub fn from_json(source: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the signed-in user.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the audience scope.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Replace the dispatcher settings.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Skip (or enable) the experiment fetch in `init()`.
    #[must_use]
    pub const fn with_experiment_fetch(mut self, enabled: bool) -> Self {
        self.load_experiments_on_init = enabled;
        self
    }

    /// Identity derived from user and session ids.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.clone(), self.session_id.clone())
    }

    /// Check the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty session id or bad dispatcher settings.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(Error::InvalidInput("sessionId must not be empty".into()));
        }
        self.dispatcher.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.offline_capacity, 1000);
        assert_eq!(config.events_path, "/events");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dispatcher_validation() {
        assert!(DispatcherConfig::default().with_batch_size(0).validate().is_err());
        assert!(DispatcherConfig::default().with_offline_capacity(0).validate().is_err());
        assert!(DispatcherConfig::default()
            .with_flush_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_tracker_defaults_generate_session() {
        let a = TrackerConfig::default();
        let b = TrackerConfig::default();
        assert_ne!(a.session_id, b.session_id);
        assert!(a.load_experiments_on_init);
    }

    #[test]
    fn test_from_json_partial() {
        let config = TrackerConfig::from_json(
            r#"{"sessionId": "s-1", "dispatcher": {"flushIntervalMs": 10000}}"#,
        )
        .unwrap();
        assert_eq!(config.session_id, "s-1");
        assert_eq!(config.dispatcher.flush_interval(), Duration::from_secs(10));
        assert_eq!(config.dispatcher.batch_size, 10);
    }

    #[test]
    fn test_from_json_rejects_blank_session() {
        assert!(TrackerConfig::from_json(r#"{"sessionId": "  "}"#).is_err());
        assert!(TrackerConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_identity_from_config() {
        let identity = TrackerConfig::new("s-1").with_user_id("u-1").identity();
        assert_eq!(identity.key(), "u-1");
        assert_eq!(identity.session_id(), "s-1");
    }
}
