//! Epoch Treasury Daemon Library
//!
//! Runtime orchestrator for the epoch treasury.
//!
//! # Architecture
//!
//! ```text
//! HTTP client → API Server ─┐
//!                           ├→ Executor → Engine → Ports (ledger, venue, oracle)
//! Keeper (epoch boundary) ──┘                    → Store
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Keeper**: Triggers the automatic fee harvest once per epoch
//! - **API**: HTTP endpoints for partner, trader and owner operations
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use treasuryd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let daemon = Daemon::new_stub(config).await?;
//!     daemon.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod keeper;

// Re-exports for convenience
pub use api::{create_router, ApiState};
pub use config::{ApiConfig, Config, Environment, KeeperConfig, TreasuryConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use keeper::Keeper;
