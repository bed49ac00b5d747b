//! JSON-over-HTTP client shared by the embedding and chat providers.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors, including timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! [`JsonClient::post_once`] skips retries entirely for callers that have
//! their own fallback.

use anyhow::{bail, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// `reqwest` client with a per-request timeout and bounded retries.
#[derive(Clone)]
pub struct JsonClient {
    client: reqwest::Client,
    /// Provider name used in error messages (e.g. `"Ollama"`).
    label: &'static str,
    max_retries: u32,
}

impl JsonClient {
    pub fn new(label: &'static str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            label,
            max_retries,
        })
    }

    /// POST `body` to `url` and return the parsed JSON response.
    pub async fn post(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<Value> {
        self.post_with_retries(url, bearer, body, self.max_retries).await
    }

    /// Single attempt: a timeout or server error fails immediately.
    pub async fn post_once(&self, url: &str, bearer: Option<&str>, body: &Value) -> Result<Value> {
        self.post_with_retries(url, bearer, body, 0).await
    }

    async fn post_with_retries(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
        max_retries: u32,
    ) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                debug!(attempt, ?delay, url, "retrying request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(body);
            if let Some(key) = bearer {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if is_retryable(status) {
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            self.label,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("{} API error {}: {}", self.label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "{} connection error (is it reachable at {}?): {}",
                        self.label,
                        url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", self.label)))
    }
}

/// Rate limits and server errors are worth another attempt.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before retry number `attempt` (1-based).
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}
