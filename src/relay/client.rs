//! Outbound webhook client with bounded retry.
//!
//! One call moves through `Attempting -> {Succeeded | Retrying -> Attempting | Failed}`.
//! Transport failures and 5xx responses are retried with exponential backoff
//! (`base * 2^attempt`, no jitter: 2s then 4s by default); 4xx responses fail
//! immediately.
//!
//! The backoff is a `tokio::time::sleep`, so no worker is held while waiting.
//! Dropping the returned future (e.g. when the inbound connection closes)
//! cancels the pending sleep and any in-flight attempt.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use super::error::RelayError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    /// Retries after the first attempt; total attempts = `max_retries + 1`
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_retries: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (0-based). The first attempt is immediate.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// A response that did not fail: the decoded body plus its status line.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub data: Value,
    pub status: u16,
    pub status_text: String,
}

#[derive(Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    policy: RetryPolicy,
    timeout: Duration,
}

impl ResilientClient {
    /// Build a client whose every attempt is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::Request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::from_http(http, timeout))
    }

    /// Wrap an existing `reqwest::Client`, e.g. one with proxies disabled
    pub fn from_http(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            policy: RetryPolicy::default(),
            timeout,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// POST `body` as JSON to `url`, retrying per the policy.
    #[tracing::instrument(skip(self, body), fields(max_retries = self.policy.max_retries))]
    pub async fn post_json<T>(&self, url: &str, body: &T) -> Result<RelayResponse, RelayError>
    where
        T: Serialize + ?Sized,
    {
        let started = Instant::now();
        let mut last_error: Option<RelayError> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.backoff(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(url, body).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            attempt = attempt + 1,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Webhook call succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_retries => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_retries + 1,
                        error = %err,
                        "Webhook call failed, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        retryable = err.is_retryable(),
                        error = %err,
                        "Webhook call failed"
                    );
                    return Err(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| RelayError::Request("retry loop ended without a result".to_string())))
    }

    async fn send_once<T>(&self, url: &str, body: &T) -> Result<RelayResponse, RelayError>
    where
        T: Serialize + ?Sized,
    {
        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        // An error status is reported even when its body cannot be read
        let data = match response.bytes().await {
            Ok(bytes) => decode_body(&bytes),
            Err(e) if status.is_client_error() || status.is_server_error() => {
                tracing::debug!(status = status.as_u16(), error = %e, "Failed to read error body");
                Value::Null
            }
            Err(e) => return Err(e.into()),
        };

        if status.is_client_error() {
            return Err(RelayError::UpstreamClient {
                body: data,
                status: status.as_u16(),
                status_text,
            });
        }
        if status.is_server_error() {
            return Err(RelayError::UpstreamServer {
                body: data,
                status: status.as_u16(),
                status_text,
            });
        }

        Ok(RelayResponse {
            data,
            status: status.as_u16(),
            status_text,
        })
    }
}

/// JSON bodies decode as-is, anything else becomes a string, empty becomes null
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(br#"{"output":"hi"}"#), json!({"output": "hi"}));
        assert_eq!(decode_body(b"plain text"), json!("plain text"));
    }
}
