//! Treasury error taxonomy.
//!
//! Every variant is raised synchronously to the immediate caller and
//! leaves the treasury untouched.

use crate::value_objects::{Amount, Leg, Principal, Role, Timestamp};

/// Errors raised by treasury validation and state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreasuryError {
    /// Caller is not the principal the operation requires
    #[error("Unauthorized: {caller} is not the {required}")]
    Unauthorized {
        /// Role the operation is restricted to
        required: Role,
        /// Principal that attempted the call
        caller: Principal,
    },

    /// Initialize called on the template instance
    #[error("Template treasury cannot be initialized")]
    NotInitializable,

    /// Initialize called on an already provisioned instance
    #[error("Treasury is already initialized")]
    AlreadyInitialized,

    /// Operation attempted before initialize
    #[error("Treasury is not initialized")]
    NotInitialized,

    /// Pre-inform attempted inside the closing margin of the epoch
    #[error("Pre-inform window closed: {remaining}s to next epoch, margin is {margin}s")]
    WindowClosed {
        /// Seconds left until the next epoch boundary
        remaining: u64,
        /// Closing margin before the boundary
        margin: u64,
    },

    /// Withdraw requested more than the pending pre-informed amount
    #[error("Amount exceeds pre-informed: requested ({requested_a}, {requested_b}), pending ({pending_a}, {pending_b})")]
    AmountExceedsPreinformed {
        /// Requested amount of asset A
        requested_a: Amount,
        /// Requested amount of asset B
        requested_b: Amount,
        /// Pending amount of asset A
        pending_a: Amount,
        /// Pending amount of asset B
        pending_b: Amount,
    },

    /// Harvest or withdrawal rollover attempted before the epoch watermark advanced
    #[error("Already harvested this epoch: next allowed at {next_allowed}")]
    AlreadyHarvestedThisEpoch {
        /// Earliest time the operation becomes valid again
        next_allowed: Timestamp,
    },

    /// Debit would drive a reserve negative
    #[error("Insufficient reserve {leg}: requested {requested}, available {available}")]
    InsufficientReserve {
        /// Reserve that was debited
        leg: Leg,
        /// Requested debit
        requested: Amount,
        /// Balance before the debit
        available: Amount,
    },

    /// Realized output below the caller's minimum
    #[error("Slippage exceeded on {leg}: minimum {minimum}, realized {realized}")]
    SlippageExceeded {
        /// Leg whose output fell short
        leg: Leg,
        /// Caller-supplied minimum
        minimum: Amount,
        /// Realized amount
        realized: Amount,
    },

    /// Asset is not one of the pair custodied by this treasury
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Amount must be non-zero
    #[error("Amount must be non-zero")]
    ZeroAmount,

    /// Initialization parameters are inconsistent
    #[error("Invalid terms: {0}")]
    InvalidTerms(String),

    /// Fixed-point arithmetic overflowed
    #[error("Math overflow: {0}")]
    MathOverflow(&'static str),
}

/// Result type for treasury operations.
pub type TreasuryResult<T> = Result<T, TreasuryError>;
