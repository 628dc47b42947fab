//! Keeper: triggers the automatic fee harvest.
//!
//! Harvests are permissionless, so nothing happens at an epoch boundary
//! unless someone calls in. The keeper polls every active treasury and
//! harvests the ones that are due. A failed harvest is logged and retried
//! on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use treasury_domain::TreasuryId;
use treasury_exec::{AssetTransferPort, Executor, PriceOraclePort, Receipt, SwapVenuePort};
use treasury_store::Store;

use crate::config::KeeperConfig;
use crate::error::DaemonResult;

/// Background harvester.
pub struct Keeper<L, V, O, S>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    executor: Arc<Executor<L, V, O, S>>,
    config: KeeperConfig,
    shutdown_token: CancellationToken,
}

impl<L, V, O, S> Keeper<L, V, O, S>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    /// Create a keeper over `executor`.
    pub fn new(executor: Arc<Executor<L, V, O, S>>, config: KeeperConfig) -> Self {
        Self { executor, config, shutdown_token: CancellationToken::new() }
    }

    /// Whether `id` can be harvested now
    pub async fn check_upkeep(&self, id: TreasuryId) -> DaemonResult<bool> {
        Ok(self.executor.is_harvest_due(id).await?)
    }

    /// Harvest `id` if it is due.
    ///
    /// Returns `None` when no harvest was needed.
    pub async fn perform_upkeep(&self, id: TreasuryId) -> DaemonResult<Option<Receipt>> {
        if !self.check_upkeep(id).await? {
            return Ok(None);
        }
        let receipt = self.executor.harvest(id).await?;
        info!(treasury_id = %id, events = receipt.events.len(), "Keeper harvested");
        Ok(Some(receipt))
    }

    /// One pass over every active treasury. Returns how many were harvested.
    pub async fn tick(&self) -> DaemonResult<usize> {
        let treasuries = self.executor.store().treasuries().find_active().await?;
        let mut harvested = 0;

        for treasury in treasuries {
            match self.perform_upkeep(treasury.id).await {
                Ok(Some(_)) => harvested += 1,
                Ok(None) => {},
                Err(e) => {
                    error!(treasury_id = %treasury.id, error = %e, "Keeper harvest failed");
                },
            }
        }

        debug!(harvested, "Keeper tick complete");
        Ok(harvested)
    }

    /// Start the keeper loop in the background.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.config.interval_secs, "Keeper started");

            loop {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => {
                        info!("Keeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(self.config.interval_secs)) => {
                        if let Err(e) = self.tick().await {
                            error!(error = %e, "Keeper tick failed");
                        }
                    }
                }
            }

            info!("Keeper stopped");
        })
    }

    /// Stop the keeper loop.
    pub fn shutdown(&self) {
        info!("Shutting down keeper");
        self.shutdown_token.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use treasury_domain::{
        InitializeParams, Principal, SqrtPriceX96, Treasury, DEFAULT_EPOCH_DURATION,
    };
    use treasury_exec::{ManualClock, StubAssetLedger, StubOracle, StubVenue};
    use treasury_store::MemoryStore;
    use uuid::Uuid;

    const T0: u64 = 1_700_000_000;

    type StubKeeper = Keeper<StubAssetLedger, StubVenue, StubOracle, MemoryStore>;

    async fn create_keeper() -> (Arc<StubKeeper>, Arc<ManualClock>, Arc<StubOracle>, TreasuryId) {
        let ledger = Arc::new(StubAssetLedger::new());
        let venue = Arc::new(StubVenue::new(ledger.clone(), Principal::new("pool"), 3_000));
        let oracle = Arc::new(StubOracle::new(SqrtPriceX96::from_ratio(1, 1).unwrap()));
        let clock = Arc::new(ManualClock::new(T0));
        let executor = Arc::new(Executor::new(
            ledger,
            venue,
            oracle.clone(),
            Arc::new(MemoryStore::new()),
            clock.clone(),
        ));

        let treasury = Treasury::provisioned(Uuid::now_v7(), Principal::new("treasury"));
        executor.register(&treasury).await.unwrap();
        executor
            .initialize(
                treasury.id,
                InitializeParams {
                    partner: Principal::new("partner"),
                    trader: Principal::new("trader"),
                    owner: Principal::new("owner"),
                    asset_x: treasury_domain::AssetId::new("USDC"),
                    asset_y: treasury_domain::AssetId::new("WETH"),
                    epoch_start: T0,
                    epoch_duration: DEFAULT_EPOCH_DURATION,
                    pre_inform_margin: None,
                    fee_rate: None,
                    fee_asset: None,
                    venue: Principal::new("router"),
                    pool_fee_tier: None,
                },
            )
            .await
            .unwrap();

        let keeper = Arc::new(Keeper::new(executor, KeeperConfig { enabled: true, interval_secs: 1 }));
        (keeper, clock, oracle, treasury.id)
    }

    #[tokio::test]
    async fn test_upkeep_not_needed_mid_epoch() {
        let (keeper, clock, _, id) = create_keeper().await;
        clock.advance(30 * 86_400);

        assert!(!keeper.check_upkeep(id).await.unwrap());
        assert!(keeper.perform_upkeep(id).await.unwrap().is_none());
        assert_eq!(keeper.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upkeep_harvests_once_per_epoch() {
        let (keeper, clock, _, id) = create_keeper().await;
        clock.set(T0 + DEFAULT_EPOCH_DURATION);

        assert!(keeper.check_upkeep(id).await.unwrap());
        assert_eq!(keeper.tick().await.unwrap(), 1);
        assert_eq!(keeper.tick().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tick_survives_failed_harvest() {
        let (keeper, clock, oracle, id) = create_keeper().await;
        clock.set(T0 + DEFAULT_EPOCH_DURATION);
        oracle.set_fail_next(true);

        assert_eq!(keeper.tick().await.unwrap(), 0);
        assert!(keeper.check_upkeep(id).await.unwrap());
        assert_eq!(keeper.tick().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keeper_loop_stops_on_shutdown() {
        let (keeper, _, _, _) = create_keeper().await;
        let handle = keeper.clone().start();
        keeper.shutdown();
        handle.await.unwrap();
    }
}
