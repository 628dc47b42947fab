//! Domain Entities for the epoch treasury
//!
//! The `Treasury` aggregate and the records it owns. Every field is
//! mutated only through the engine; the entity itself enforces the
//! lifecycle and reserve invariants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::epoch::{EpochSchedule, DEFAULT_PRE_INFORM_MARGIN};
use crate::error::{TreasuryError, TreasuryResult};
use crate::price::SqrtPriceX96;
use crate::value_objects::{
    Amount, AssetId, AssetPair, FeeRate, Leg, Principal, Role, Timestamp, TreasuryId,
};

/// Default venue fee tier, in hundredths of a basis point (0.3%)
pub const DEFAULT_POOL_FEE_TIER: u32 = 3_000;

// =============================================================================
// Reserves
// =============================================================================

/// The two custodied balances.
///
/// # Invariants
/// - Never negative (enforced by `debit`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    /// Balance of asset A
    pub a: Amount,
    /// Balance of asset B
    pub b: Amount,
}

impl Reserves {
    /// Create reserves from both balances
    pub fn new(a: Amount, b: Amount) -> Self {
        Self { a, b }
    }

    /// Balance of a leg
    pub fn get(&self, leg: Leg) -> Amount {
        match leg {
            Leg::A => self.a,
            Leg::B => self.b,
        }
    }

    fn slot(&mut self, leg: Leg) -> &mut Amount {
        match leg {
            Leg::A => &mut self.a,
            Leg::B => &mut self.b,
        }
    }

    /// Subtract from a leg
    ///
    /// # Errors
    /// Returns `TreasuryError::InsufficientReserve` if the balance would go negative
    pub fn debit(&mut self, leg: Leg, amount: Amount) -> TreasuryResult<()> {
        let slot = self.slot(leg);
        *slot = slot.checked_sub(amount).ok_or(TreasuryError::InsufficientReserve {
            leg,
            requested: amount,
            available: *slot,
        })?;
        Ok(())
    }

    /// Add to a leg
    ///
    /// # Errors
    /// Returns `TreasuryError::MathOverflow` on overflow
    pub fn credit(&mut self, leg: Leg, amount: Amount) -> TreasuryResult<()> {
        let slot = self.slot(leg);
        *slot = slot.checked_add(amount).ok_or(TreasuryError::MathOverflow("reserve credit"))?;
        Ok(())
    }

    /// Subtract from a leg, flooring at zero
    pub fn saturating_debit(&mut self, leg: Leg, amount: Amount) {
        let slot = self.slot(leg);
        *slot = slot.saturating_sub(amount);
    }
}

// =============================================================================
// Pre-inform
// =============================================================================

/// The partner's declared withdrawal intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreInform {
    /// Requested amount of asset A
    pub amount_a: Amount,
    /// Requested amount of asset B
    pub amount_b: Amount,
    /// Start of the epoch in which the intent was recorded
    pub recorded_epoch_start: Timestamp,
}

impl PreInform {
    /// Amount pending on a leg
    pub fn get(&self, leg: Leg) -> Amount {
        match leg {
            Leg::A => self.amount_a,
            Leg::B => self.amount_b,
        }
    }

    /// Whether nothing is left to withdraw
    pub fn is_consumed(&self) -> bool {
        self.amount_a == 0 && self.amount_b == 0
    }
}

/// Reserve snapshot that profit is measured against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Reserves at the last harvest or initialization, adjusted for flows since
    pub reserves: Reserves,
    /// Venue price observed at the last harvest
    pub sqrt_price: Option<SqrtPriceX96>,
}

// =============================================================================
// Terms
// =============================================================================

/// Parameters fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryTerms {
    /// Depositing partner
    pub partner: Principal,
    /// Trader
    pub trader: Principal,
    /// Operator
    pub owner: Principal,
    /// Custodied assets, canonically ordered
    pub assets: AssetPair,
    /// Epoch grid and pre-inform margin
    pub schedule: EpochSchedule,
    /// Share of profit taken as fee
    pub fee_rate: FeeRate,
    /// Asset the performance fee is denominated and paid in
    pub fee_asset: Leg,
    /// Default swap router
    pub venue: Principal,
    /// Fee tier of the default pool, in hundredths of a basis point
    pub pool_fee_tier: u32,
}

impl TreasuryTerms {
    /// Principal holding a role
    pub fn principal(&self, role: Role) -> &Principal {
        match role {
            Role::Partner => &self.partner,
            Role::Trader => &self.trader,
            Role::Owner => &self.owner,
        }
    }

    /// Require `caller` to hold `role`
    ///
    /// # Errors
    /// Returns `TreasuryError::Unauthorized` otherwise
    pub fn authorize(&self, role: Role, caller: &Principal) -> TreasuryResult<()> {
        if self.principal(role) == caller {
            Ok(())
        } else {
            Err(TreasuryError::Unauthorized { required: role, caller: caller.clone() })
        }
    }
}

/// Arguments of `initialize`, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Depositing partner
    pub partner: Principal,
    /// Trader
    pub trader: Principal,
    /// Operator
    pub owner: Principal,
    /// Either asset of the pair; ordering is applied on validation
    pub asset_x: AssetId,
    /// The other asset
    pub asset_y: AssetId,
    /// First epoch boundary
    pub epoch_start: Timestamp,
    /// Epoch length in seconds
    pub epoch_duration: u64,
    /// Pre-inform closing margin, 3 days when unset
    #[serde(default)]
    pub pre_inform_margin: Option<u64>,
    /// Performance fee rate, 20% when unset
    #[serde(default)]
    pub fee_rate: Option<FeeRate>,
    /// Defaults to asset B
    #[serde(default)]
    pub fee_asset: Option<AssetId>,
    /// Default swap router
    pub venue: Principal,
    /// Fee tier of the default pool
    #[serde(default)]
    pub pool_fee_tier: Option<u32>,
}

impl InitializeParams {
    /// Validate and build the terms
    ///
    /// # Errors
    /// Returns `TreasuryError::InvalidTerms` for empty or shared principals,
    /// identical assets or an invalid schedule, and `TreasuryError::UnknownAsset` for a
    /// fee asset outside the pair
    pub fn into_terms(self) -> TreasuryResult<TreasuryTerms> {
        for (role, principal) in [
            (Role::Partner, &self.partner),
            (Role::Trader, &self.trader),
            (Role::Owner, &self.owner),
        ] {
            if principal.is_empty() {
                return Err(TreasuryError::InvalidTerms(format!("{} must be set", role)));
            }
        }
        // one identity per role
        for (first, second, a, b) in [
            (Role::Partner, Role::Trader, &self.partner, &self.trader),
            (Role::Partner, Role::Owner, &self.partner, &self.owner),
            (Role::Trader, Role::Owner, &self.trader, &self.owner),
        ] {
            if a == b {
                return Err(TreasuryError::InvalidTerms(format!(
                    "{} and {} must be different principals, both are {}",
                    first, second, a
                )));
            }
        }
        if self.venue.is_empty() {
            return Err(TreasuryError::InvalidTerms("venue must be set".to_string()));
        }

        let assets = AssetPair::new(self.asset_x, self.asset_y)?;
        let schedule = EpochSchedule::new(
            self.epoch_start,
            self.epoch_duration,
            self.pre_inform_margin.unwrap_or(DEFAULT_PRE_INFORM_MARGIN),
        )?;
        let fee_asset = match &self.fee_asset {
            Some(asset) => assets.leg_of(asset)?,
            None => Leg::B,
        };

        Ok(TreasuryTerms {
            partner: self.partner,
            trader: self.trader,
            owner: self.owner,
            assets,
            schedule,
            fee_rate: self.fee_rate.unwrap_or_default(),
            fee_asset,
            venue: self.venue,
            pool_fee_tier: self.pool_fee_tier.unwrap_or(DEFAULT_POOL_FEE_TIER),
        })
    }
}

// =============================================================================
// Treasury
// =============================================================================

/// Initialization state of a treasury instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Template instance; never initialisable
    Template,
    /// Provisioned instance awaiting `initialize`
    Uninitialized,
    /// Initialized, with its fixed terms
    Active {
        /// Terms fixed at initialization
        terms: TreasuryTerms,
    },
}

/// A per-partner treasury.
///
/// # Invariants
/// - Reserves are never negative
/// - At most one pending pre-inform
/// - `Uninitialized -> Active` happens once; `Template` never transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    /// Instance identifier
    pub id: TreasuryId,
    /// Account holding the custodied assets
    pub account: Principal,
    /// Template, uninitialized or active
    pub lifecycle: Lifecycle,
    /// Custodied balances
    pub reserves: Reserves,
    /// Pending withdrawal intent
    pub pending: Option<PreInform>,
    /// Epoch start of the last completed withdrawal
    pub last_withdraw_epoch_start: Timestamp,
    /// Watermark of the last fee harvest (an epoch boundary)
    pub last_fee_harvest_time: Timestamp,
    /// Profit basis
    pub baseline: Baseline,
    /// Recipient of automatic harvests; the trader when unset
    pub fee_recipient: Option<Principal>,
}

impl Treasury {
    fn blank(id: TreasuryId, account: Principal, lifecycle: Lifecycle) -> Self {
        Self {
            id,
            account,
            lifecycle,
            reserves: Reserves::default(),
            pending: None,
            last_withdraw_epoch_start: 0,
            last_fee_harvest_time: 0,
            baseline: Baseline::default(),
            fee_recipient: None,
        }
    }

    /// The template instance new treasuries are cloned from
    pub fn template(account: Principal) -> Self {
        Self::blank(Uuid::now_v7(), account, Lifecycle::Template)
    }

    /// A freshly provisioned instance
    pub fn provisioned(id: TreasuryId, account: Principal) -> Self {
        Self::blank(id, account, Lifecycle::Uninitialized)
    }

    /// Whether `initialize` has run
    pub fn is_initialized(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active { .. })
    }

    /// Terms of an initialized treasury
    ///
    /// # Errors
    /// Returns `TreasuryError::NotInitialized` before initialization
    pub fn terms(&self) -> TreasuryResult<&TreasuryTerms> {
        match &self.lifecycle {
            Lifecycle::Active { terms } => Ok(terms),
            _ => Err(TreasuryError::NotInitialized),
        }
    }

    /// Move to `Active`, anchoring both watermarks at the current epoch
    ///
    /// # Errors
    /// - `NotInitializable` on the template
    /// - `AlreadyInitialized` on an active instance
    pub fn activate(&mut self, terms: TreasuryTerms, now: Timestamp) -> TreasuryResult<()> {
        match self.lifecycle {
            Lifecycle::Template => return Err(TreasuryError::NotInitializable),
            Lifecycle::Active { .. } => return Err(TreasuryError::AlreadyInitialized),
            Lifecycle::Uninitialized => {},
        }

        let epoch_start = terms.schedule.current_epoch_start(now);
        self.last_withdraw_epoch_start = epoch_start;
        self.last_fee_harvest_time = epoch_start;
        self.baseline = Baseline { reserves: self.reserves, sqrt_price: None };
        self.lifecycle = Lifecycle::Active { terms };
        Ok(())
    }

    /// Pending pre-informed amounts, zero when none
    pub fn pending_amounts(&self) -> (Amount, Amount) {
        self.pending.map(|p| (p.amount_a, p.amount_b)).unwrap_or((0, 0))
    }

    /// Recipient of automatic fee harvests
    pub fn effective_fee_recipient(&self) -> TreasuryResult<&Principal> {
        match &self.fee_recipient {
            Some(recipient) => Ok(recipient),
            None => Ok(&self.terms()?.trader),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::SECONDS_PER_DAY;

    const T0: Timestamp = 1_700_000_000;

    fn params() -> InitializeParams {
        InitializeParams {
            partner: Principal::new("partner"),
            trader: Principal::new("trader"),
            owner: Principal::new("owner"),
            asset_x: AssetId::new("WETH"),
            asset_y: AssetId::new("USDC"),
            epoch_start: T0,
            epoch_duration: 90 * SECONDS_PER_DAY,
            pre_inform_margin: None,
            fee_rate: None,
            fee_asset: None,
            venue: Principal::new("router"),
            pool_fee_tier: None,
        }
    }

    #[test]
    fn test_reserves_debit_credit() {
        let mut reserves = Reserves::new(10, 20);
        reserves.debit(Leg::A, 10).unwrap();
        reserves.credit(Leg::B, 5).unwrap();
        assert_eq!(reserves, Reserves::new(0, 25));

        let err = reserves.debit(Leg::A, 1).unwrap_err();
        assert_eq!(
            err,
            TreasuryError::InsufficientReserve { leg: Leg::A, requested: 1, available: 0 }
        );
        assert_eq!(reserves.a, 0);
    }

    #[test]
    fn test_reserves_credit_overflow() {
        let mut reserves = Reserves::new(Amount::MAX, 0);
        assert!(matches!(reserves.credit(Leg::A, 1), Err(TreasuryError::MathOverflow(_))));
    }

    #[test]
    fn test_terms_defaults() {
        let terms = params().into_terms().unwrap();
        assert_eq!(terms.assets.a().as_str(), "USDC");
        assert_eq!(terms.fee_asset, Leg::B);
        assert_eq!(terms.fee_rate, FeeRate::default());
        assert_eq!(terms.schedule.pre_inform_margin(), DEFAULT_PRE_INFORM_MARGIN);
        assert_eq!(terms.pool_fee_tier, DEFAULT_POOL_FEE_TIER);
    }

    #[test]
    fn test_terms_reject_missing_principal() {
        let mut p = params();
        p.trader = Principal::new(" ");
        assert!(matches!(p.into_terms(), Err(TreasuryError::InvalidTerms(_))));
    }

    #[test]
    fn test_terms_reject_shared_principal() {
        let alice = Principal::new("alice");
        for (partner, trader, owner) in [
            (alice.clone(), alice.clone(), Principal::new("owner")),
            (alice.clone(), Principal::new("trader"), alice.clone()),
            (Principal::new("partner"), alice.clone(), alice.clone()),
        ] {
            let mut p = params();
            p.partner = partner;
            p.trader = trader;
            p.owner = owner;
            assert!(matches!(p.into_terms(), Err(TreasuryError::InvalidTerms(_))));
        }
    }

    #[test]
    fn test_authorize() {
        let terms = params().into_terms().unwrap();
        assert!(terms.authorize(Role::Partner, &Principal::new("partner")).is_ok());
        let err = terms.authorize(Role::Trader, &Principal::new("partner")).unwrap_err();
        assert!(matches!(err, TreasuryError::Unauthorized { required: Role::Trader, .. }));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let terms = params().into_terms().unwrap();

        let mut template = Treasury::template(Principal::new("template"));
        assert_eq!(template.activate(terms.clone(), T0), Err(TreasuryError::NotInitializable));

        let mut treasury = Treasury::provisioned(Uuid::now_v7(), Principal::new("treasury"));
        assert_eq!(treasury.terms().unwrap_err(), TreasuryError::NotInitialized);
        treasury.activate(terms.clone(), T0 + 10).unwrap();
        assert!(treasury.is_initialized());
        assert_eq!(treasury.last_withdraw_epoch_start, T0);
        assert_eq!(treasury.last_fee_harvest_time, T0);
        assert_eq!(treasury.activate(terms, T0 + 20), Err(TreasuryError::AlreadyInitialized));
    }

    #[test]
    fn test_fee_recipient_defaults_to_trader() {
        let mut treasury = Treasury::provisioned(Uuid::now_v7(), Principal::new("treasury"));
        treasury.activate(params().into_terms().unwrap(), T0).unwrap();
        assert_eq!(treasury.effective_fee_recipient().unwrap().as_str(), "trader");

        treasury.fee_recipient = Some(Principal::new("desk"));
        assert_eq!(treasury.effective_fee_recipient().unwrap().as_str(), "desk");
    }

    #[test]
    fn test_treasury_serde_roundtrip() {
        let mut treasury = Treasury::provisioned(Uuid::now_v7(), Principal::new("treasury"));
        treasury.activate(params().into_terms().unwrap(), T0).unwrap();
        let json = serde_json::to_string(&treasury).unwrap();
        assert!(json.contains("\"state\":\"active\""));
        let parsed: Treasury = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, treasury);
    }
}
