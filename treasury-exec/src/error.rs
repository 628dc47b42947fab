//! Execution layer error types.

use thiserror::Error;
use treasury_domain::{TreasuryError, TreasuryId};

/// Errors that can occur while executing a treasury operation.
///
/// Every variant leaves the treasury exactly as it was before the call.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Domain validation or state transition rejected the operation
    #[error(transparent)]
    Treasury(#[from] TreasuryError),

    /// Asset transfer, venue or oracle call failed
    #[error("External call failed: {0}")]
    ExternalCall(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] treasury_store::StoreError),

    /// No treasury with this id is registered
    #[error("Treasury not found: {0}")]
    NotFound(TreasuryId),
}

impl ExecError {
    /// Create an external call error
    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalCall(msg.into())
    }

    /// The domain error, if this is one
    pub fn as_treasury(&self) -> Option<&TreasuryError> {
        match self {
            ExecError::Treasury(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
