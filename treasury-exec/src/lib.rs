//! Epoch Treasury Execution Layer
//!
//! Atomic execution of treasury operations against external collaborators.
//!
//! # Architecture
//!
//! ```text
//! Caller → Executor → Engine Decision → Ports (ledger, venue, oracle) → Store
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits for asset transfers, the swap venue and the price oracle
//! - **Clock**: Injectable time source (system or manual)
//! - **Executor**: Loads, decides, runs the actions and commits or rolls back
//! - **Stub**: In-memory adapters for tests and the stub daemon
//!
//! # Example
//!
//! ```rust,ignore
//! use treasury_exec::{Executor, ManualClock, StubAssetLedger, StubOracle, StubVenue};
//! use treasury_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(StubAssetLedger::new());
//! let venue = Arc::new(StubVenue::new(ledger.clone(), Principal::new("pool"), 3_000));
//! let oracle = Arc::new(StubOracle::new(SqrtPriceX96::from_ratio(1, 1)?));
//! let executor = Executor::new(
//!     ledger, venue, oracle, Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(0)),
//! );
//!
//! executor.register(&treasury).await?;
//! let receipt = executor.deposit(treasury.id, &partner, 10_000, 10_000).await?;
//! ```

#![warn(clippy::all)]

pub mod clock;
pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ExecError, ExecResult};
pub use executor::{Executor, Receipt};
pub use ports::{AssetTransferPort, PriceOraclePort, SwapRequest, SwapVenuePort};
pub use stub::{StubAssetLedger, StubOracle, StubVenue};
