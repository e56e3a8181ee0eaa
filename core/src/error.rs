use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage unavailable at {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Only surfaced when a caller-supplied date bound is unparsable; per-record
    /// dates that fail to parse are excluded by the filter instead.
    #[error("malformed date {0:?}")]
    MalformedDate(String),

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(#[from] sled::Error),
}

impl RagError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RagError::InvalidArgument(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        RagError::SchemaMismatch(msg.into())
    }

    /// True for errors caused by the caller's input rather than by storage.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            RagError::InvalidArgument(_) | RagError::SchemaMismatch(_) | RagError::MalformedDate(_)
        )
    }
}
