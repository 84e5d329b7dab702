use serde_json::Value;
use thiserror::Error;

/// Final outcome of a failed outbound call, classified by how far it got.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request could not be built or dispatched (bad URL, bad body)
    #[error("Request error: {0}")]
    Request(String),
    /// No response was received: connect failure, timeout, broken body
    #[error("Network error ({code}): {message}")]
    Transport { code: &'static str, message: String },
    /// The endpoint answered 4xx. Never retried.
    #[error("HTTP {status}: {status_text}")]
    UpstreamClient {
        body: Value,
        status: u16,
        status_text: String,
    },
    /// The endpoint answered 5xx
    #[error("HTTP {status}: {status_text}")]
    UpstreamServer {
        body: Value,
        status: u16,
        status_text: String,
    },
}

impl RelayError {
    /// Transport failures and 5xx responses may succeed on another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Transport { .. } | RelayError::UpstreamServer { .. }
        )
    }

    /// HTTP status of the upstream response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::UpstreamClient { status, .. } | RelayError::UpstreamServer { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            return RelayError::Request(e.to_string());
        }

        let code = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connect"
        } else if e.is_body() || e.is_decode() {
            "body"
        } else {
            "network"
        };
        RelayError::Transport {
            code,
            message: e.to_string(),
        }
    }
}
