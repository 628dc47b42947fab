//! Daemon error types.

use thiserror::Error;
use treasury_domain::TreasuryError;
use treasury_exec::ExecError;
use treasury_store::StoreError;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] TreasuryError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

impl DaemonError {
    /// The domain rejection behind this error, if any
    pub fn as_treasury(&self) -> Option<&TreasuryError> {
        match self {
            DaemonError::Domain(e) => Some(e),
            DaemonError::Exec(e) => e.as_treasury(),
            _ => None,
        }
    }
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
