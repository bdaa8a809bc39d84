use parley_store::StoreError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced to the caller of an engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed request, rejected before the store is touched.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The actor may not act on this conversation, message or call.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The record is no longer in a state that allows the action.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
