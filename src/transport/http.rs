//! reqwest-backed collector transport.
//!
//! Beacons are detached tasks on the current tokio runtime: the caller returns
//! immediately and the request finishes (or fails silently) on its own.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::{paths, Transport};
use crate::{Error, Result};

/// HTTP transport against a collector base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    audience: Option<String>,
}

impl HttpTransport {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a transport for `base_url` (e.g. `https://collector.example.com/api`).
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Self::DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            audience: None,
        })
    }

    /// Send the audience header on every request.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.audience {
            Some(audience) => builder.header(paths::AUDIENCE_HEADER, audience),
            None => builder,
        }
    }
}

impl Transport for HttpTransport {
    async fn get_json(&self, path: &str, headers: &[(&str, &str)]) -> Result<serde_json::Value> {
        let mut builder = self.request(reqwest::Method::GET, path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = builder.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "{path} answered {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn beacon(&self, path: &str, body: serde_json::Value) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path, "beacon dropped: no tokio runtime");
            return false;
        };
        let request = self.request(reqwest::Method::POST, path).json(&body);
        let path = path.to_string();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) => debug!(path = %path, status = %response.status(), "beacon delivered"),
                Err(error) => debug!(path = %path, %error, "beacon lost"),
            }
        });
        true
    }
}
