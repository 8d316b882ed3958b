//! Error types for the key-value backend and the file service.

use thiserror::Error;

pub type KvResult<T> = Result<T, KvError>;
pub type VfsResult<T> = Result<T, VfsError>;

/// Backend failures. A missing key is not an error.
#[derive(Debug, Error)]
pub enum KvError {
    /// Storage could not be reached or the operation failed midway.
    #[error("backend unavailable: {message}")]
    Unavailable { message: String },

    /// A stored metadata column is not a JSON object.
    #[error("corrupt metadata for key '{key}': {reason}")]
    CorruptMetadata { key: String, reason: String },

    /// List cursor does not belong to the listed prefix.
    #[error("invalid list cursor")]
    InvalidCursor,
}

impl From<rusqlite::Error> for KvError {
    fn from(e: rusqlite::Error) -> Self {
        KvError::Unavailable {
            message: e.to_string(),
        }
    }
}

/// Service-level outcomes that are not a successful read or write.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Conditional write found an existing value.
    #[error("already exists: {path}")]
    Conflict { path: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid namespace: {reason}")]
    InvalidNamespace { reason: String },

    #[error("invalid subject: {reason}")]
    InvalidSubject { reason: String },

    #[error("invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("value of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Backend(#[from] KvError),
}

impl VfsError {
    /// Caller-side problems (400-class) as opposed to storage failures.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}
