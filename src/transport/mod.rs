//! Collector transport.
//!
//! Two delivery modes:
//! - awaited JSON requests (`get_json`, `post_json`) for normal flushes and reporting
//! - [`Transport::beacon`]: fire-and-forget, returns immediately and may complete
//!   after the caller has gone away (page teardown)
//!
//! Backends:
//! - [`RecordingTransport`]: in-process, scriptable failures, for tests and demos
//! - `HttpTransport` (feature `http`): reqwest client against a collector base URL

#[cfg(feature = "http")]
mod http;
mod recording;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use recording::{RecordedRequest, RecordingTransport, RequestKind};

use crate::Result;
use std::future::Future;
use std::sync::Arc;

/// Collector endpoints.
pub mod paths {
    /// `GET` - experiments active for the audience header
    pub const ACTIVE_EXPERIMENTS: &str = "/experiments/active";
    /// `POST` - first-time assignment records
    pub const ASSIGNMENTS: &str = "/experiments/assignments";
    /// `POST` - experiment conversions
    pub const CONVERSIONS: &str = "/experiments/conversions";
    /// `POST` - batched behavioural events
    pub const EVENTS: &str = "/events";
    /// Header carrying the audience scope
    pub const AUDIENCE_HEADER: &str = "X-Audience";

    /// `GET` - per-variant results
    #[must_use]
    pub fn results(experiment_id: &str) -> String {
        format!("/experiments/{experiment_id}/results")
    }

    /// `GET` - collector-side statistics
    #[must_use]
    pub fn statistics(experiment_id: &str) -> String {
        format!("/experiments/{experiment_id}/statistics")
    }
}

/// Network capability used by the dispatcher and the tracker.
pub trait Transport: Send + Sync {
    /// `GET path` and decode the JSON body.
    fn get_json(
        &self,
        path: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<serde_json::Value>> + Send;

    /// `POST path` with a JSON body; success means a 2xx response.
    fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Queue a one-way delivery that may outlive the caller.
    ///
    /// Returns `true` when the payload was accepted for delivery, which says
    /// nothing about whether it arrived.
    fn beacon(&self, path: &str, body: serde_json::Value) -> bool;
}

impl<T: Transport> Transport for Arc<T> {
    fn get_json(
        &self,
        path: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<serde_json::Value>> + Send {
        (**self).get_json(path, headers)
    }

    fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).post_json(path, body)
    }

    fn beacon(&self, path: &str, body: serde_json::Value) -> bool {
        (**self).beacon(path, body)
    }
}
