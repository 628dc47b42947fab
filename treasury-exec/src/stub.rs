//! Stub implementations for testing.
//!
//! These implementations simulate the asset ledger, the swap venue and the
//! price oracle in memory. The venue settles through the ledger, so a
//! ledger rollback also undoes the pool side of a swap.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use treasury_domain::price::mul_div;
use treasury_domain::{Amount, AssetId, Principal, SqrtPriceX96};

use crate::error::ExecError;
use crate::ports::{AssetTransferPort, PriceOraclePort, SwapRequest, SwapVenuePort};

fn lock_err<T>(err: PoisonError<T>) -> ExecError {
    ExecError::external(format!("Failed to acquire stub lock: {}", err))
}

// =============================================================================
// Stub Asset Ledger
// =============================================================================

#[derive(Debug, Clone, Default)]
struct LedgerState {
    balances: HashMap<(AssetId, Principal), Amount>,
    allowances: HashMap<(AssetId, Principal, Principal), Amount>,
}

impl LedgerState {
    fn balance(&self, asset: &AssetId, account: &Principal) -> Amount {
        self.balances.get(&(asset.clone(), account.clone())).copied().unwrap_or(0)
    }

    fn move_balance(
        &mut self,
        asset: &AssetId,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), ExecError> {
        let available = self.balance(asset, from);
        if available < amount {
            return Err(ExecError::external(format!(
                "{} balance of {} is {}, cannot move {}",
                asset, from, available, amount
            )));
        }
        let credited = self
            .balance(asset, to)
            .checked_add(amount)
            .ok_or_else(|| ExecError::external(format!("{} balance overflow for {}", asset, to)))?;
        self.balances.insert((asset.clone(), from.clone()), available - amount);
        self.balances.insert((asset.clone(), to.clone()), credited);
        Ok(())
    }
}

/// In-memory fungible-asset ledger.
///
/// `begin` snapshots balances and allowances, `rollback` restores the
/// snapshot. Failures can be injected for the next call or for every
/// movement of one asset.
#[derive(Debug, Default)]
pub struct StubAssetLedger {
    state: RwLock<LedgerState>,
    snapshot: RwLock<Option<LedgerState>>,
    fail_next: RwLock<bool>,
    failing_asset: RwLock<Option<AssetId>>,
}

impl StubAssetLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to an account out of thin air.
    pub fn mint(&self, asset: &AssetId, account: &Principal, amount: Amount) {
        if let Ok(mut state) = self.state.write() {
            let balance = state.balance(asset, account).saturating_add(amount);
            state.balances.insert((asset.clone(), account.clone()), balance);
        }
    }

    /// Balance of an account (0 if unknown)
    pub fn balance(&self, asset: &AssetId, account: &Principal) -> Amount {
        self.state.read().map(|s| s.balance(asset, account)).unwrap_or(0)
    }

    /// Remaining allowance of `spender` over `owner`'s asset
    pub fn allowance(&self, asset: &AssetId, owner: &Principal, spender: &Principal) -> Amount {
        self.state
            .read()
            .map(|s| {
                s.allowances
                    .get(&(asset.clone(), owner.clone(), spender.clone()))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Configure the next call to fail.
    pub fn set_fail_next(&self, fail: bool) {
        if let Ok(mut fail_next) = self.fail_next.write() {
            *fail_next = fail;
        }
    }

    /// Fail every approve/transfer of `asset` until cleared.
    pub fn set_failing_asset(&self, asset: Option<AssetId>) {
        if let Ok(mut failing) = self.failing_asset.write() {
            *failing = asset;
        }
    }

    /// Whether a batch is open
    pub fn in_transaction(&self) -> bool {
        self.snapshot.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Check if we should fail the next operation.
    fn should_fail(&self, asset: Option<&AssetId>) -> Result<bool, ExecError> {
        let mut fail_next = self.fail_next.write().map_err(lock_err)?;
        if *fail_next {
            *fail_next = false; // Reset after check
            return Ok(true);
        }
        let failing = self.failing_asset.read().map_err(lock_err)?;
        Ok(matches!((failing.as_ref(), asset), (Some(f), Some(a)) if f == a))
    }
}

#[async_trait]
impl AssetTransferPort for StubAssetLedger {
    async fn approve(
        &self,
        asset: &AssetId,
        owner: &Principal,
        spender: &Principal,
        amount: Amount,
    ) -> Result<(), ExecError> {
        if self.should_fail(Some(asset))? {
            return Err(ExecError::external("Simulated approve failure"));
        }
        let mut state = self.state.write().map_err(lock_err)?;
        state.allowances.insert((asset.clone(), owner.clone(), spender.clone()), amount);
        Ok(())
    }

    async fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &Principal,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), ExecError> {
        if self.should_fail(Some(asset))? {
            return Err(ExecError::external("Simulated transfer_from failure"));
        }
        let mut state = self.state.write().map_err(lock_err)?;
        let key = (asset.clone(), from.clone(), spender.clone());
        let allowed = state.allowances.get(&key).copied().unwrap_or(0);
        if allowed < amount {
            return Err(ExecError::external(format!(
                "{} allowance of {} for {} is {}, cannot pull {}",
                asset, spender, from, allowed, amount
            )));
        }
        state.move_balance(asset, from, to, amount)?;
        state.allowances.insert(key, allowed - amount);
        Ok(())
    }

    async fn transfer(
        &self,
        asset: &AssetId,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), ExecError> {
        if self.should_fail(Some(asset))? {
            return Err(ExecError::external("Simulated transfer failure"));
        }
        let mut state = self.state.write().map_err(lock_err)?;
        state.move_balance(asset, from, to, amount)
    }

    async fn balance_of(&self, asset: &AssetId, account: &Principal) -> Result<Amount, ExecError> {
        if self.should_fail(None)? {
            return Err(ExecError::external("Simulated balance read failure"));
        }
        let state = self.state.read().map_err(lock_err)?;
        Ok(state.balance(asset, account))
    }

    async fn begin(&self) -> Result<(), ExecError> {
        let state = self.state.read().map_err(lock_err)?.clone();
        *self.snapshot.write().map_err(lock_err)? = Some(state);
        Ok(())
    }

    async fn commit(&self) -> Result<(), ExecError> {
        *self.snapshot.write().map_err(lock_err)? = None;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), ExecError> {
        let snapshot = self.snapshot.write().map_err(lock_err)?.take();
        if let Some(previous) = snapshot {
            *self.state.write().map_err(lock_err)? = previous;
        }
        Ok(())
    }
}

// =============================================================================
// Stub Venue
// =============================================================================

/// Fee tiers are expressed in millionths
const FEE_DENOMINATOR: Amount = 1_000_000;

/// Output of a constant-product swap after the pool fee, rounded down.
pub fn constant_product_out(
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
    fee_tier: u32,
) -> Result<Amount, ExecError> {
    let fee = Amount::from(fee_tier).min(FEE_DENOMINATOR);
    let after_fee = mul_div(amount_in, FEE_DENOMINATOR - fee, FEE_DENOMINATOR)
        .map_err(|e| ExecError::external(e.to_string()))?;
    let denominator = reserve_in
        .checked_add(after_fee)
        .ok_or_else(|| ExecError::external("pool reserve overflow"))?;
    mul_div(after_fee, reserve_out, denominator).map_err(|e| ExecError::external(e.to_string()))
}

/// Single constant-product pool whose reserves are the pool account's
/// balances in the stub ledger.
pub struct StubVenue {
    ledger: Arc<StubAssetLedger>,
    pool: Principal,
    fee_tier: u32,
    fail_next: RwLock<bool>,
}

impl StubVenue {
    /// Create a venue with its pool account held in `ledger`.
    pub fn new(ledger: Arc<StubAssetLedger>, pool: Principal, fee_tier: u32) -> Self {
        Self { ledger, pool, fee_tier, fail_next: RwLock::new(false) }
    }

    /// Add liquidity to the pool.
    pub fn seed_liquidity(&self, asset: &AssetId, amount: Amount) {
        self.ledger.mint(asset, &self.pool, amount);
    }

    /// Pool account
    pub fn pool(&self) -> &Principal {
        &self.pool
    }

    /// Configure the next swap to fail.
    pub fn set_fail_next(&self, fail: bool) {
        if let Ok(mut fail_next) = self.fail_next.write() {
            *fail_next = fail;
        }
    }

    fn should_fail(&self) -> Result<bool, ExecError> {
        let mut fail_next = self.fail_next.write().map_err(lock_err)?;
        let fail = *fail_next;
        *fail_next = false;
        Ok(fail)
    }
}

#[async_trait]
impl SwapVenuePort for StubVenue {
    async fn exact_input_swap(&self, request: &SwapRequest) -> Result<Amount, ExecError> {
        if self.should_fail()? {
            return Err(ExecError::external("Simulated swap failure"));
        }
        if request.fee_tier != self.fee_tier {
            return Err(ExecError::external(format!(
                "No pool for {}/{} at fee tier {}",
                request.asset_in, request.asset_out, request.fee_tier
            )));
        }

        let reserve_in = self.ledger.balance(&request.asset_in, &self.pool);
        let reserve_out = self.ledger.balance(&request.asset_out, &self.pool);
        let amount_out =
            constant_product_out(request.amount_in, reserve_in, reserve_out, self.fee_tier)?;
        if amount_out == 0 {
            return Err(ExecError::external("Swap output rounds to zero"));
        }

        self.ledger
            .transfer_from(
                &request.asset_in,
                &request.router,
                &request.payer,
                &self.pool,
                request.amount_in,
            )
            .await?;
        self.ledger
            .transfer(&request.asset_out, &self.pool, &request.recipient, amount_out)
            .await?;

        tracing::debug!(
            router = %request.router,
            amount_in = request.amount_in,
            amount_out,
            "Stub: swap settled"
        );
        Ok(amount_out)
    }
}

// =============================================================================
// Stub Oracle
// =============================================================================

/// Stub price oracle with a settable price.
pub struct StubOracle {
    price: RwLock<SqrtPriceX96>,
    fail_next: RwLock<bool>,
}

impl StubOracle {
    /// Create an oracle quoting `price`.
    pub fn new(price: SqrtPriceX96) -> Self {
        Self { price: RwLock::new(price), fail_next: RwLock::new(false) }
    }

    /// Change the quoted price.
    pub fn set_price(&self, price: SqrtPriceX96) {
        if let Ok(mut current) = self.price.write() {
            *current = price;
        }
    }

    /// Configure the next read to fail.
    pub fn set_fail_next(&self, fail: bool) {
        if let Ok(mut fail_next) = self.fail_next.write() {
            *fail_next = fail;
        }
    }
}

#[async_trait]
impl PriceOraclePort for StubOracle {
    async fn sqrt_price_x96(
        &self,
        _asset_a: &AssetId,
        _asset_b: &AssetId,
    ) -> Result<SqrtPriceX96, ExecError> {
        {
            let mut fail_next = self.fail_next.write().map_err(lock_err)?;
            if *fail_next {
                *fail_next = false;
                return Err(ExecError::external("Simulated oracle failure"));
            }
        }
        let price = self.price.read().map_err(lock_err)?;
        Ok(*price)
    }
}

// =============================================================================
// Tests
// =============================================================================
