//! Upstream poll error types.

use thiserror::Error;

/// Result type for upstream operations.
pub type PollResult<T> = Result<T, PollError>;

/// Errors that can end a poll cycle.
///
/// Every variant is treated as transient by the poller. The split exists so
/// logs and the health endpoint can tell the failure classes apart.
#[derive(Debug, Error)]
pub enum PollError {
    /// HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Request could not be sent or the body could not be read.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {0}")]
    Status(reqwest::StatusCode),

    /// Body is not JSON.
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// JSON does not have the expected field types.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl PollError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Client(_) => "client",
            PollError::Transport { .. } => "transport",
            PollError::Status(_) => "status",
            PollError::Decode(_) => "decode",
            PollError::Shape(_) => "shape",
        }
    }
}
