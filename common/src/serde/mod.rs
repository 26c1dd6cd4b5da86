//! Order-preserving encodings for storage keys.
//!
//! Keys written through these helpers compare bytewise in the same order as
//! the values they encode, which is what makes range scans over an ordered
//! store meaningful.

pub mod key_prefix;
pub mod sortable;
pub mod terminated_bytes;

/// Error returned when stored bytes cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializeError {
    pub message: String,
}

impl DeserializeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::error::Error for DeserializeError {}

impl std::fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
