//! Upstream HTTP client.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use super::error::{PollError, PollResult};
use crate::config::Config;

/// Client for the round-result notify endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    /// HTTP client.
    client: Client,
    /// Full notify URL, query string included.
    url: String,
}

impl UpstreamClient {
    /// Create a client with a request timeout and a fixed User-Agent.
    pub fn new(
        url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> PollResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(PollError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &Config) -> PollResult<Self> {
        Self::new(
            config.upstream_url.clone(),
            &config.user_agent,
            config.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and decode the current envelope.
    pub async fn fetch(&self) -> PollResult<Value> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| self.transport(source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| self.transport(source))?;

        Ok(serde_json::from_slice(&body)?)
    }

    fn transport(&self, source: reqwest::Error) -> PollError {
        PollError::Transport {
            url: self.url.clone(),
            source,
        }
    }
}
