//! Epoch Treasury Daemon
//!
//! Runs the harvest keeper and the HTTP API over a stub environment.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p treasuryd
//!
//! # Start with custom environment
//! TREASURY_ENV=test TREASURY_API_PORT=8081 cargo run -p treasuryd
//! ```
//!
//! # Environment Variables
//!
//! - `TREASURY_ENV`: Environment (test, development, production)
//! - `TREASURY_API_HOST`: API host (default: 0.0.0.0)
//! - `TREASURY_API_PORT`: API port (default: 8080)
//! - `TREASURY_EPOCH_DURATION_SECS`: Epoch length (default: 7776000, 90 days)
//! - `TREASURY_EPOCH_START`: First epoch start, Unix seconds (default: now)
//! - `TREASURY_PRE_INFORM_MARGIN_SECS`: Pre-inform closing margin (default: 259200, 3 days)
//! - `TREASURY_FEE_PERCENT`: Performance fee (default: 20)
//! - `TREASURY_KEEPER_ENABLED`: Run the harvest keeper (default: true)
//! - `TREASURY_KEEPER_INTERVAL_SECS`: Keeper poll interval (default: 60)

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use treasuryd::{Config, Daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("treasuryd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        fee_percent = %config.treasury.fee_percent,
        "Epoch Treasury Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::new_stub(config).await?;
    daemon.run().await?;

    Ok(())
}
