//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Executor (treasury operations)
//! - Keeper (automatic harvest at epoch boundaries)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Bootstrap the treasury (stub environment: provision, initialize, fund)
//! 3. Start the keeper
//! 4. Start API server
//! 5. Wait for SIGINT
//! 6. Stop the keeper and drain the API server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use treasury_domain::{
    Amount, AssetId, FeeRate, InitializeParams, Principal, SqrtPriceX96, Treasury, TreasuryId,
};
use treasury_exec::{
    AssetTransferPort, Clock, Executor, PriceOraclePort, StubAssetLedger, StubOracle, StubVenue,
    SwapVenuePort, SystemClock,
};
use treasury_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::keeper::Keeper;

/// Liquidity seeded into each side of the stub pool
const STUB_POOL_DEPTH: Amount = 10_000_000_000;
/// Balance minted to the demo partner for each asset
const STUB_PARTNER_FUNDS: Amount = 1_000_000;

// =============================================================================
// Daemon
// =============================================================================

/// The treasury daemon.
pub struct Daemon<L, V, O, S>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    /// Configuration
    config: Config,
    /// Executor shared by the API and the keeper
    executor: Arc<Executor<L, V, O, S>>,
    /// Treasury served by the API
    treasury_id: TreasuryId,
    /// Harvest keeper
    keeper: Arc<Keeper<L, V, O, S>>,
    /// Stops the API server
    shutdown_token: CancellationToken,
}

impl Daemon<StubAssetLedger, StubVenue, StubOracle, MemoryStore> {
    /// Create a daemon over stub components (for testing/development).
    ///
    /// Provisions and initializes one USDC/WETH treasury, seeds the stub
    /// pool and funds the demo partner with an approval to the treasury.
    pub async fn new_stub(config: Config) -> DaemonResult<Self> {
        let ledger = Arc::new(StubAssetLedger::new());
        let venue = Arc::new(StubVenue::new(ledger.clone(), Principal::new("pool"), 3_000));
        let usdc = AssetId::new("USDC");
        let weth = AssetId::new("WETH");
        venue.seed_liquidity(&usdc, STUB_POOL_DEPTH);
        venue.seed_liquidity(&weth, STUB_POOL_DEPTH);

        let price = SqrtPriceX96::from_ratio(1, 1)?;
        let oracle = Arc::new(StubOracle::new(price));
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let executor =
            Arc::new(Executor::new(ledger.clone(), venue, oracle, store, clock.clone()));

        let account = Principal::new("treasury");
        let treasury = Treasury::provisioned(Uuid::now_v7(), account.clone());
        executor.register(&treasury).await?;

        let terms = &config.treasury;
        let params = InitializeParams {
            partner: Principal::new("partner"),
            trader: Principal::new("trader"),
            owner: Principal::new("owner"),
            asset_x: usdc.clone(),
            asset_y: weth.clone(),
            epoch_start: terms.epoch_start.unwrap_or_else(|| clock.now()),
            epoch_duration: terms.epoch_duration_secs,
            pre_inform_margin: Some(terms.pre_inform_margin_secs),
            fee_rate: Some(FeeRate::from_percent(terms.fee_percent)?),
            fee_asset: None,
            venue: Principal::new("router"),
            pool_fee_tier: None,
        };
        let partner = params.partner.clone();
        executor.initialize(treasury.id, params).await?;

        for asset in [&usdc, &weth] {
            ledger.mint(asset, &partner, STUB_PARTNER_FUNDS);
            ledger.approve(asset, &partner, &account, STUB_PARTNER_FUNDS).await?;
        }
        info!(treasury_id = %treasury.id, "Stub treasury bootstrapped");

        Ok(Self::new(config, executor, treasury.id))
    }
}

impl<L, V, O, S> Daemon<L, V, O, S>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    /// Create a new daemon with provided components.
    pub fn new(config: Config, executor: Arc<Executor<L, V, O, S>>, treasury_id: TreasuryId) -> Self {
        let keeper = Arc::new(Keeper::new(executor.clone(), config.keeper.clone()));
        Self {
            config,
            executor,
            treasury_id,
            keeper,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Shared executor
    pub fn executor(&self) -> &Arc<Executor<L, V, O, S>> {
        &self.executor
    }

    /// Treasury served by the API
    pub fn treasury_id(&self) -> TreasuryId {
        self.treasury_id
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            treasury_id = %self.treasury_id,
            "Starting treasury daemon"
        );

        // 1. Start keeper
        let keeper_handle = if self.config.keeper.enabled {
            Some(self.keeper.clone().start())
        } else {
            info!("Keeper disabled");
            None
        };

        // 2. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Wait for shutdown
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to listen for ctrl-c: {}", e)))?;
        info!("Received shutdown signal");

        // 4. Graceful shutdown
        self.keeper.shutdown();
        if let Some(handle) = keeper_handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Keeper task panicked");
            }
        }
        self.shutdown_token.cancel();

        let treasury = self.executor.treasury(self.treasury_id).await?;
        info!(
            reserve_a = treasury.reserves.a,
            reserve_b = treasury.reserves.b,
            "Shutdown complete"
        );

        Ok(())
    }

    /// Start the API server.
    pub async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            executor: self.executor.clone(),
            treasury_id: self.treasury_id,
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind to {}: {}", addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        // Spawn the server task
        let shutdown = self.shutdown_token.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }
}

// =============================================================================
// Tests
// =============================================================================
