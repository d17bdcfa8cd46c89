//! Single update attempt against the provider.

use super::request::{build_url, redacted_url};
use super::response::{classify, UpdateResult};
use crate::config::Config;
use crate::error::{DynipError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Fixed timeout for one update request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Performs update requests for one configured hostname.
#[derive(Clone)]
pub struct UpdateClient {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl UpdateClient {
    /// Create a new client with the 90 second request timeout.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, config })
    }

    /// Hostname being kept up to date.
    pub fn hostname(&self) -> &str {
        &self.config.hostname
    }

    /// Perform exactly one update request.
    ///
    /// The body is read and classified whatever the HTTP status. Failures
    /// before a body is obtained become [`DynipError::Network`]; failure
    /// codes from the provider become [`DynipError::Provider`].
    pub async fn update_ip(&self) -> Result<UpdateResult> {
        let url = build_url(&self.config);
        tracing::debug!(hostname = %self.hostname(), "request: {}", redacted_url(&self.config));

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(hostname = %self.hostname(), %status, "response: {}", text);

        match classify(&text) {
            (true, result) => Ok(result),
            (false, result) => Err(DynipError::Provider(result)),
        }
    }
}
