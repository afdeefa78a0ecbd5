//! Command-log error type wrapping I/O and serialization errors.

use std::path::PathBuf;

use flowhub_domain::error::FlowHubError;

/// Errors originating from the JSON-lines command log.
#[derive(Debug, thiserror::Error)]
pub enum JsonlLogError {
    /// Opening, writing or flushing the active file failed.
    #[error("failed to write command log {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving the full file aside failed.
    #[error("failed to rotate command log {path}")]
    Rotate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded.
    #[error("failed to encode log record")]
    Json(#[from] serde_json::Error),
}

impl From<JsonlLogError> for FlowHubError {
    fn from(err: JsonlLogError) -> Self {
        Self::Storage(Box::new(err))
    }
}
