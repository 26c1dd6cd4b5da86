//! Error types for feedview.

use common::StorageError;
use common::serde::DeserializeError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The storage backend failed. Retried at batch granularity.
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted bytes could not be decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A view's `map` failed on an entry that passed sanitization.
    #[error("view '{view}' failed to map entry: {message}")]
    Map { view: String, message: String },

    /// The view stopped indexing after an unrecoverable failure.
    #[error("view '{view}' halted: {reason}")]
    Halted { view: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the failed batch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<DeserializeError> for Error {
    fn from(err: DeserializeError) -> Self {
        Error::Encoding(err.message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
