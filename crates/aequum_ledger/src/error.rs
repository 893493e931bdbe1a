//! Error taxonomy. Not-found and invalid-input abort an operation before any
//! mutation; rate-unavailable and fetch failures are absorbed by the currency
//! layer and never surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// A referenced record does not exist. Never silently treated as zero.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Rejected before any state mutation is attempted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound { entity, id: id.into() }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
