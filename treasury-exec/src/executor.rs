//! Executor: runs treasury operations atomically.
//!
//! The Executor is the bridge between the pure Engine (decisions) and the
//! impure ports (asset ledger, venue, oracle). Each operation runs under a
//! single executor-wide lock.
//!
//! # Flow
//!
//! ```text
//! lock → load → read ports → Engine decision → begin
//!      → actions → save state + append events → commit
//!                        ↘ (any failure) rollback
//! ```

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use treasury_domain::{
    Amount, AssetId, InitializeParams, Principal, Timestamp, Treasury, TreasuryEvent, TreasuryId,
};
use treasury_engine::{Decision, EngineAction, EpochStatus, FeeAssessment, TreasuryEngine};
use treasury_store::{Store, StoredEvent};

use crate::clock::Clock;
use crate::error::{ExecError, ExecResult};
use crate::ports::{AssetTransferPort, PriceOraclePort, SwapRequest, SwapVenuePort};

// =============================================================================
// Receipt
// =============================================================================

/// Result of a committed operation.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Treasury state after the operation
    pub treasury: Treasury,
    /// Events emitted, in order
    pub events: Vec<TreasuryEvent>,
}

// =============================================================================
// Executor
// =============================================================================

/// Executes treasury operations with all-or-nothing semantics.
///
/// The Executor:
/// 1. Serializes operations (one at a time across all treasuries)
/// 2. Reads external state (prices, balances) before deciding
/// 3. Asks the Engine for a decision
/// 4. Runs the decision's actions inside a transfer-port transaction
/// 5. Persists state and events, then commits
pub struct Executor<L, V, O, S>
where
    L: AssetTransferPort,
    V: SwapVenuePort,
    O: PriceOraclePort,
    S: Store,
{
    engine: TreasuryEngine,
    transfers: Arc<L>,
    venue: Arc<V>,
    oracle: Arc<O>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl<L, V, O, S> Executor<L, V, O, S>
where
    L: AssetTransferPort,
    V: SwapVenuePort,
    O: PriceOraclePort,
    S: Store,
{
    /// Create a new executor.
    pub fn new(
        transfers: Arc<L>,
        venue: Arc<V>,
        oracle: Arc<O>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: TreasuryEngine::new(),
            transfers,
            venue,
            oracle,
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// The executor's time source
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The executor's store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Register a provisioned (or template) treasury.
    pub async fn register(&self, treasury: &Treasury) -> ExecResult<()> {
        self.store.treasuries().insert(treasury).await?;
        info!(treasury_id = %treasury.id, account = %treasury.account, "Treasury registered");
        Ok(())
    }

    /// Current state of a treasury
    pub async fn treasury(&self, id: TreasuryId) -> ExecResult<Treasury> {
        self.store.treasuries().find_by_id(id).await?.ok_or(ExecError::NotFound(id))
    }

    /// Epoch information at the clock's current time
    pub async fn epoch_status(&self, id: TreasuryId) -> ExecResult<EpochStatus> {
        let treasury = self.treasury(id).await?;
        Ok(self.engine.epoch_status(&treasury, self.clock.now())?)
    }

    /// Whether an automatic harvest would be accepted now
    pub async fn is_harvest_due(&self, id: TreasuryId) -> ExecResult<bool> {
        let treasury = self.treasury(id).await?;
        Ok(self.engine.is_harvest_due(&treasury, self.clock.now()))
    }

    /// Fee that a harvest at the current oracle price would take
    pub async fn preview_fee(&self, id: TreasuryId) -> ExecResult<FeeAssessment> {
        let treasury = self.treasury(id).await?;
        let terms = treasury.terms()?;
        let sqrt_price = self.oracle.sqrt_price_x96(terms.assets.a(), terms.assets.b()).await?;
        Ok(self.engine.assess_fee(&treasury, sqrt_price)?)
    }

    /// Event log of a treasury
    pub async fn events(&self, id: TreasuryId) -> ExecResult<Vec<StoredEvent>> {
        Ok(self.store.events().find_by_treasury(id).await?)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// One-time initialization.
    pub async fn initialize(&self, id: TreasuryId, params: InitializeParams) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        let decision = self.engine.initialize(&treasury, params, now)?;
        info!(treasury_id = %id, "Initializing treasury");
        self.commit_decision(decision, now).await
    }

    /// Pull both amounts from `caller` into the reserves.
    pub async fn deposit(
        &self,
        id: TreasuryId,
        caller: &Principal,
        amount_a: Amount,
        amount_b: Amount,
    ) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        let decision = self.engine.deposit(&treasury, caller, amount_a, amount_b, now)?;
        info!(treasury_id = %id, %caller, amount_a, amount_b, "Deposit");
        self.commit_decision(decision, now).await
    }

    /// Record the partner's withdrawal intent.
    pub async fn pre_inform(
        &self,
        id: TreasuryId,
        caller: &Principal,
        amount_a: Amount,
        amount_b: Amount,
    ) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        let decision = self.engine.pre_inform(&treasury, caller, amount_a, amount_b, now)?;
        info!(treasury_id = %id, amount_a, amount_b, "Withdrawal pre-informed");
        self.commit_decision(decision, now).await
    }

    /// Partner withdrawal after the epoch has rolled over.
    pub async fn withdraw(
        &self,
        id: TreasuryId,
        caller: &Principal,
        amount_a: Amount,
        amount_b: Amount,
    ) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        let decision = self.engine.withdraw(&treasury, caller, amount_a, amount_b, now)?;
        info!(treasury_id = %id, amount_a, amount_b, "Withdrawal");
        self.commit_decision(decision, now).await
    }

    /// Trader swap through `router`.
    pub async fn swap(
        &self,
        id: TreasuryId,
        caller: &Principal,
        router: &Principal,
        asset_in: &AssetId,
        amount_in: Amount,
    ) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        let decision = self.engine.swap(&treasury, caller, router, asset_in, amount_in)?;
        info!(treasury_id = %id, %router, %asset_in, amount_in, "Swap");
        self.commit_decision(decision, now).await
    }

    /// Permissionless automatic harvest.
    pub async fn harvest(&self, id: TreasuryId) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        self.engine.check_harvest_due(&treasury, now)?;
        let terms = treasury.terms()?;
        let sqrt_price = self.oracle.sqrt_price_x96(terms.assets.a(), terms.assets.b()).await?;

        let decision = self.engine.harvest(&treasury, sqrt_price, now)?;
        info!(treasury_id = %id, %sqrt_price, "Harvesting fee");
        self.commit_decision(decision, now).await
    }

    /// Trader-initiated fee withdrawal paid in `output_asset`.
    pub async fn withdraw_fee(
        &self,
        id: TreasuryId,
        caller: &Principal,
        min_out_a: Amount,
        min_out_b: Amount,
        output_asset: &AssetId,
        recipient: &Principal,
    ) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        self.engine.check_harvest_due(&treasury, now)?;
        let terms = treasury.terms()?;
        let sqrt_price = self.oracle.sqrt_price_x96(terms.assets.a(), terms.assets.b()).await?;

        let decision = self.engine.withdraw_fee(
            &treasury,
            caller,
            min_out_a,
            min_out_b,
            output_asset,
            recipient,
            sqrt_price,
            now,
        )?;
        info!(treasury_id = %id, %output_asset, %recipient, "Withdrawing fee");
        self.commit_decision(decision, now).await
    }

    /// Trader nominates the recipient of automatic harvests.
    pub async fn set_fee_recipient(
        &self,
        id: TreasuryId,
        caller: &Principal,
        recipient: Principal,
    ) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        let decision = self.engine.set_fee_recipient(&treasury, caller, recipient, now)?;
        self.commit_decision(decision, now).await
    }

    /// Owner reconciliation against the ledger's balances.
    pub async fn sync_reserves(&self, id: TreasuryId, caller: &Principal) -> ExecResult<Receipt> {
        let _guard = self.lock.lock().await;
        let treasury = self.treasury(id).await?;
        let now = self.clock.now();

        let terms = treasury.terms()?;
        terms.authorize(treasury_domain::Role::Owner, caller)?;
        let balance_a = self.transfers.balance_of(terms.assets.a(), &treasury.account).await?;
        let balance_b = self.transfers.balance_of(terms.assets.b(), &treasury.account).await?;

        let decision = self.engine.sync_reserves(&treasury, caller, balance_a, balance_b, now)?;
        info!(treasury_id = %id, balance_a, balance_b, "Reserves synced");
        self.commit_decision(decision, now).await
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Run a decision's actions and persist the result, or undo everything.
    async fn commit_decision(&self, decision: Decision, now: Timestamp) -> ExecResult<Receipt> {
        let Decision { mut treasury, actions, mut events } = decision;

        self.transfers.begin().await?;
        let outcome = match self.execute_actions(&mut treasury, &actions, &mut events, now).await {
            Ok(()) => self.persist(&treasury, &events).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            warn!(treasury_id = %treasury.id, error = %e, "Operation failed, rolling back");
            if let Err(rollback_err) = self.transfers.rollback().await {
                error!(treasury_id = %treasury.id, error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }

        self.transfers.commit().await?;
        Ok(Receipt { treasury, events })
    }

    async fn execute_actions(
        &self,
        treasury: &mut Treasury,
        actions: &[EngineAction],
        events: &mut Vec<TreasuryEvent>,
        now: Timestamp,
    ) -> ExecResult<()> {
        for action in actions {
            match action {
                EngineAction::Pull { asset, from, amount } => {
                    debug!(%asset, %from, amount, "Pulling");
                    self.transfers
                        .transfer_from(asset, &treasury.account, from, &treasury.account, *amount)
                        .await?;
                },
                EngineAction::Pay { asset, to, amount } => {
                    debug!(%asset, %to, amount, "Paying");
                    self.transfers.transfer(asset, &treasury.account, to, *amount).await?;
                },
                EngineAction::Swap(order) => {
                    let recipient = match &order.settlement {
                        treasury_engine::SwapSettlement::CreditReserve { .. } => {
                            treasury.account.clone()
                        },
                        treasury_engine::SwapSettlement::Forward { recipient } => recipient.clone(),
                    };
                    let fee_tier = treasury.terms()?.pool_fee_tier;

                    self.transfers
                        .approve(&order.asset_in, &treasury.account, &order.router, order.amount_in)
                        .await?;
                    let amount_out = self
                        .venue
                        .exact_input_swap(&SwapRequest {
                            router: order.router.clone(),
                            asset_in: order.asset_in.clone(),
                            asset_out: order.asset_out.clone(),
                            fee_tier,
                            amount_in: order.amount_in,
                            payer: treasury.account.clone(),
                            recipient,
                        })
                        .await?;

                    info!(
                        treasury_id = %treasury.id,
                        asset_in = %order.asset_in,
                        amount_in = order.amount_in,
                        amount_out,
                        "Swap filled"
                    );
                    events.push(self.engine.settle_swap(treasury, order, amount_out, now)?);
                },
            }
        }
        Ok(())
    }

    async fn persist(&self, treasury: &Treasury, events: &[TreasuryEvent]) -> ExecResult<()> {
        self.store.begin_transaction().await?;
        let result = async {
            self.store.treasuries().save(treasury).await?;
            for event in events {
                let seq = self.store.events().append(event).await?;
                debug!(seq, event_type = event.event_type(), "Event appended");
            }
            Ok::<(), ExecError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.store.commit().await?;
                Ok(())
            },
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback().await {
                    error!(error = %rollback_err, "Store rollback failed");
                }
                Err(e)
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stub::{StubAssetLedger, StubOracle, StubVenue};
    use treasury_domain::{Reserves, SqrtPriceX96, TreasuryError, DEFAULT_EPOCH_DURATION};
    use treasury_store::MemoryStore;
    use uuid::Uuid;

    const T0: Timestamp = 1_700_000_000;

    struct Harness {
        executor: Executor<StubAssetLedger, StubVenue, StubOracle, MemoryStore>,
        ledger: Arc<StubAssetLedger>,
        clock: Arc<ManualClock>,
        id: TreasuryId,
    }

    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }
    fn weth() -> AssetId {
        AssetId::new("WETH")
    }

    async fn create_test_executor() -> Harness {
        let ledger = Arc::new(StubAssetLedger::new());
        let venue = Arc::new(StubVenue::new(ledger.clone(), Principal::new("pool"), 3_000));
        let oracle = Arc::new(StubOracle::new(SqrtPriceX96::from_ratio(1, 1).unwrap()));
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));

        let executor = Executor::new(ledger.clone(), venue, oracle, store, clock.clone());
        let treasury = Treasury::provisioned(Uuid::now_v7(), Principal::new("treasury"));
        executor.register(&treasury).await.unwrap();
        executor
            .initialize(
                treasury.id,
                InitializeParams {
                    partner: Principal::new("partner"),
                    trader: Principal::new("trader"),
                    owner: Principal::new("owner"),
                    asset_x: usdc(),
                    asset_y: weth(),
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

        Harness { executor, ledger, clock, id: treasury.id }
    }

    async fn fund_partner(h: &Harness, amount: Amount) {
        let partner = Principal::new("partner");
        let account = Principal::new("treasury");
        for asset in [usdc(), weth()] {
            h.ledger.mint(&asset, &partner, amount);
            h.ledger.approve(&asset, &partner, &account, amount).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_deposit_moves_assets() {
        let h = create_test_executor().await;
        fund_partner(&h, 10_000).await;

        let receipt =
            h.executor.deposit(h.id, &Principal::new("partner"), 10_000, 10_000).await.unwrap();

        assert_eq!(receipt.treasury.reserves, Reserves::new(10_000, 10_000));
        assert_eq!(h.ledger.balance(&usdc(), &Principal::new("treasury")), 10_000);
        assert_eq!(h.executor.treasury(h.id).await.unwrap().reserves, Reserves::new(10_000, 10_000));
        // initialized + deposited
        assert_eq!(h.executor.events(h.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_transfer_rolls_back_everything() {
        let h = create_test_executor().await;
        fund_partner(&h, 10_000).await;
        h.ledger.set_failing_asset(Some(weth()));

        let err =
            h.executor.deposit(h.id, &Principal::new("partner"), 10_000, 10_000).await.unwrap_err();
        assert!(matches!(err, ExecError::ExternalCall(_)));

        // the USDC pull that succeeded first was undone
        assert_eq!(h.ledger.balance(&usdc(), &Principal::new("partner")), 10_000);
        assert_eq!(h.ledger.balance(&usdc(), &Principal::new("treasury")), 0);
        assert_eq!(h.executor.treasury(h.id).await.unwrap().reserves, Reserves::default());
        assert_eq!(h.executor.events(h.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_domain_error_leaves_state_untouched() {
        let h = create_test_executor().await;
        let before = h.executor.treasury(h.id).await.unwrap();

        let err = h
            .executor
            .pre_inform(h.id, &Principal::new("trader"), 1, 1)
            .await
            .unwrap_err();
        assert!(matches!(err.as_treasury(), Some(TreasuryError::Unauthorized { .. })));
        assert_eq!(h.executor.treasury(h.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_treasury() {
        let h = create_test_executor().await;
        let missing = Uuid::now_v7();
        let err = h.executor.harvest(missing).await.unwrap_err();
        assert!(matches!(err, ExecError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_harvest_not_due_skips_oracle() {
        let h = create_test_executor().await;
        h.clock.advance(89 * 86_400);
        assert!(!h.executor.is_harvest_due(h.id).await.unwrap());

        let err = h.executor.harvest(h.id).await.unwrap_err();
        assert!(matches!(
            err.as_treasury(),
            Some(TreasuryError::AlreadyHarvestedThisEpoch { .. })
        ));
    }
}
