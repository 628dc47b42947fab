//! Epoch Treasury Domain Layer
//!
//! Pure domain types with zero I/O dependencies: identifiers, amounts,
//! square-root prices, the epoch schedule, the `Treasury` entity and its
//! events and errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod epoch;
pub mod error;
pub mod events;
pub mod price;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    Baseline, InitializeParams, Lifecycle, PreInform, Reserves, Treasury, TreasuryTerms,
    DEFAULT_POOL_FEE_TIER,
};
pub use epoch::{
    EpochSchedule, DEFAULT_EPOCH_DURATION, DEFAULT_PRE_INFORM_MARGIN, SECONDS_PER_DAY,
};
pub use error::{TreasuryError, TreasuryResult};
pub use events::{HarvestTrigger, TreasuryEvent};
pub use price::{SqrtPriceX96, Q96};
pub use value_objects::{
    Amount, AssetId, AssetPair, FeeRate, Leg, Principal, Role, Timestamp, TreasuryId,
};
