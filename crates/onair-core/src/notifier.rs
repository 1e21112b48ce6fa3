//! HTTP client for a running relay.
//!
//! Used by the CLI `trigger` and `status` commands to talk to `onair serve`.

use std::time::Duration;
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::message::{StatusReport, TriggerAck};

/// Default relay URL.
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:9000";

/// Sends triggers to, and reads status from, a relay server.
#[derive(Clone)]
pub struct TriggerClient {
    client: reqwest::Client,
    base_url: String,
}

impl TriggerClient {
    /// Create a client with a custom base URL.
    pub fn with_url(base_url: &str) -> Self {
        debug!(base_url = %base_url, "TriggerClient initialized");
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a line of text to `/trigger`.
    pub async fn trigger(&self, text: &str) -> RelayResult<TriggerAck> {
        let url = format!("{}/trigger", self.base_url);
        debug!(url = %url, "Sending trigger");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// GET the connection counts from `/status`.
    pub async fn status(&self) -> RelayResult<StatusReport> {
        let url = format!("{}/status", self.base_url);
        debug!(url = %url, "Fetching status");

        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> RelayResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
