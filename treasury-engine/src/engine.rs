//! Treasury decision engine.
//!
//! Every operation takes the current `Treasury` snapshot and `now`, runs
//! the authorization and validation checks in a fixed order, and returns
//! a `Decision`. The snapshot itself is never mutated: a failed check
//! leaves the caller with exactly the state it passed in.

use serde::{Deserialize, Serialize};
use tracing::debug;

use treasury_domain::{
    Amount, AssetId, Baseline, HarvestTrigger, InitializeParams, Leg, Lifecycle, PreInform,
    Principal, Reserves, Role, SqrtPriceX96, Timestamp, Treasury, TreasuryError, TreasuryEvent,
    TreasuryResult, TreasuryTerms,
};

use crate::actions::{Decision, EngineAction, SwapOrder, SwapSettlement};
use crate::fees::{self, FeeAssessment};

/// Epoch information for read accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochStatus {
    /// Zero-based epoch index
    pub epoch_index: u64,
    /// Start of the current epoch
    pub current_epoch_start: Timestamp,
    /// Start of the next epoch
    pub next_epoch_start: Timestamp,
    /// Seconds until the next epoch
    pub period_to_next_epoch: u64,
    /// Whether `pre_inform` would be accepted now
    pub pre_inform_open: bool,
    /// Whether an automatic harvest is due
    pub harvest_due: bool,
    /// Earliest time the next automatic harvest is allowed
    pub next_harvest_at: Timestamp,
}

/// Stateless decision engine for treasury operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreasuryEngine;

impl TreasuryEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// One-time initialization of a provisioned treasury
    pub fn initialize(
        &self,
        treasury: &Treasury,
        params: InitializeParams,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        match treasury.lifecycle {
            Lifecycle::Template => return Err(TreasuryError::NotInitializable),
            Lifecycle::Active { .. } => return Err(TreasuryError::AlreadyInitialized),
            Lifecycle::Uninitialized => {},
        }

        let terms = params.into_terms()?;
        let mut next = treasury.clone();
        next.activate(terms.clone(), now)?;

        let event = TreasuryEvent::Initialized { treasury_id: treasury.id, terms, at: now };
        Ok(Decision::state_only(next, event))
    }

    // =========================================================================
    // Reserve ledger
    // =========================================================================

    /// Pull both amounts from `caller` into the reserves.
    ///
    /// Anyone may deposit. Deposited capital raises the profit baseline.
    pub fn deposit(
        &self,
        treasury: &Treasury,
        caller: &Principal,
        amount_a: Amount,
        amount_b: Amount,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        let terms = treasury.terms()?;
        let mut next = treasury.clone();
        let mut actions = Vec::new();

        for (leg, amount) in [(Leg::A, amount_a), (Leg::B, amount_b)] {
            if amount == 0 {
                continue;
            }
            next.reserves.credit(leg, amount)?;
            next.baseline.reserves.credit(leg, amount)?;
            actions.push(EngineAction::Pull {
                asset: terms.assets.get(leg).clone(),
                from: caller.clone(),
                amount,
            });
        }

        let event = TreasuryEvent::Deposited {
            treasury_id: treasury.id,
            from: caller.clone(),
            amount_a,
            amount_b,
            reserves: next.reserves,
            at: now,
        };
        Ok(Decision { treasury: next, actions, events: vec![event] })
    }

    /// Owner reconciliation: set the reserves to the observed balances
    pub fn sync_reserves(
        &self,
        treasury: &Treasury,
        caller: &Principal,
        balance_a: Amount,
        balance_b: Amount,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        treasury.terms()?.authorize(Role::Owner, caller)?;

        let mut next = treasury.clone();
        next.reserves = Reserves::new(balance_a, balance_b);

        let event = TreasuryEvent::ReservesSynced {
            treasury_id: treasury.id,
            previous: treasury.reserves,
            reserves: next.reserves,
            at: now,
        };
        Ok(Decision::state_only(next, event))
    }

    // =========================================================================
    // Pre-inform and withdrawal
    // =========================================================================

    /// Record the partner's withdrawal intent for the current epoch.
    ///
    /// Replaces any earlier intent; amounts never accumulate.
    pub fn pre_inform(
        &self,
        treasury: &Treasury,
        caller: &Principal,
        amount_a: Amount,
        amount_b: Amount,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        let terms = treasury.terms()?;
        terms.authorize(Role::Partner, caller)?;

        let schedule = &terms.schedule;
        if !schedule.is_in_pre_inform_window(now) {
            return Err(TreasuryError::WindowClosed {
                remaining: schedule.period_to_next_epoch(now),
                margin: schedule.pre_inform_margin(),
            });
        }

        let epoch_start = schedule.current_epoch_start(now);
        let mut next = treasury.clone();
        next.pending = Some(PreInform { amount_a, amount_b, recorded_epoch_start: epoch_start });

        let event = TreasuryEvent::PreInformed {
            treasury_id: treasury.id,
            amount_a,
            amount_b,
            epoch_start,
            at: now,
        };
        Ok(Decision::state_only(next, event))
    }

    /// Pay out up to the pre-informed amounts once the epoch has rolled over
    pub fn withdraw(
        &self,
        treasury: &Treasury,
        caller: &Principal,
        amount_a: Amount,
        amount_b: Amount,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        let terms = treasury.terms()?;
        terms.authorize(Role::Partner, caller)?;

        let (pending_a, pending_b) = treasury.pending_amounts();
        if amount_a > pending_a || amount_b > pending_b {
            return Err(TreasuryError::AmountExceedsPreinformed {
                requested_a: amount_a,
                requested_b: amount_b,
                pending_a,
                pending_b,
            });
        }

        let current = terms.schedule.current_epoch_start(now);
        let recorded = treasury.pending.map(|p| p.recorded_epoch_start).unwrap_or(0);
        if current <= recorded || current <= treasury.last_withdraw_epoch_start {
            return Err(TreasuryError::AlreadyHarvestedThisEpoch {
                next_allowed: terms.schedule.next_epoch_start(now),
            });
        }

        let mut next = treasury.clone();
        let actions = pay_out(&mut next, terms, &terms.partner, amount_a, amount_b)?;

        if let Some(pending) = next.pending.as_mut() {
            pending.amount_a -= amount_a;
            pending.amount_b -= amount_b;
            if pending.is_consumed() {
                next.pending = None;
                next.last_withdraw_epoch_start = current;
            }
        }

        let (remaining_a, remaining_b) = next.pending_amounts();
        let event = TreasuryEvent::Withdrawn {
            treasury_id: treasury.id,
            to: terms.partner.clone(),
            amount_a,
            amount_b,
            remaining_a,
            remaining_b,
            reserves: next.reserves,
            at: now,
        };
        Ok(Decision { treasury: next, actions, events: vec![event] })
    }

    // =========================================================================
    // Swaps
    // =========================================================================

    /// Trader sells `amount_in` of a reserve asset through `router`.
    ///
    /// The reserve is debited here; the bought leg is credited by
    /// [`TreasuryEngine::settle_swap`] with the venue-reported amount.
    pub fn swap(
        &self,
        treasury: &Treasury,
        caller: &Principal,
        router: &Principal,
        asset_in: &AssetId,
        amount_in: Amount,
    ) -> TreasuryResult<Decision> {
        let terms = treasury.terms()?;
        terms.authorize(Role::Trader, caller)?;
        if amount_in == 0 {
            return Err(TreasuryError::ZeroAmount);
        }
        let leg_in = terms.assets.leg_of(asset_in)?;

        let mut next = treasury.clone();
        next.reserves.debit(leg_in, amount_in)?;

        let order = SwapOrder {
            router: router.clone(),
            asset_in: asset_in.clone(),
            asset_out: terms.assets.get(leg_in.other()).clone(),
            amount_in,
            min_amount_out: 0,
            settlement: SwapSettlement::CreditReserve { leg: leg_in.other() },
        };
        Ok(Decision { treasury: next, actions: vec![EngineAction::Swap(order)], events: Vec::new() })
    }

    /// Apply the venue-reported output of a swap to the working state
    pub fn settle_swap(
        &self,
        treasury: &mut Treasury,
        order: &SwapOrder,
        amount_out: Amount,
        now: Timestamp,
    ) -> TreasuryResult<TreasuryEvent> {
        if amount_out < order.min_amount_out {
            return Err(TreasuryError::SlippageExceeded {
                leg: treasury.terms()?.assets.leg_of(&order.asset_out)?,
                minimum: order.min_amount_out,
                realized: amount_out,
            });
        }
        match &order.settlement {
            SwapSettlement::CreditReserve { leg } => {
                treasury.reserves.credit(*leg, amount_out)?;
                Ok(TreasuryEvent::Swapped {
                    treasury_id: treasury.id,
                    router: order.router.clone(),
                    asset_in: order.asset_in.clone(),
                    asset_out: order.asset_out.clone(),
                    amount_in: order.amount_in,
                    amount_out,
                    reserves: treasury.reserves,
                    at: now,
                })
            },
            SwapSettlement::Forward { recipient } => Ok(TreasuryEvent::FeeConverted {
                treasury_id: treasury.id,
                asset_in: order.asset_in.clone(),
                asset_out: order.asset_out.clone(),
                amount_in: order.amount_in,
                amount_out,
                recipient: recipient.clone(),
                at: now,
            }),
        }
    }

    // =========================================================================
    // Fee harvest
    // =========================================================================

    /// Whether an automatic harvest would be accepted at `now`
    pub fn is_harvest_due(&self, treasury: &Treasury, now: Timestamp) -> bool {
        match treasury.terms() {
            Ok(terms) => terms.schedule.is_harvest_due(now, treasury.last_fee_harvest_time),
            Err(_) => false,
        }
    }

    /// Fail with `AlreadyHarvestedThisEpoch` unless a harvest is due
    pub fn check_harvest_due(&self, treasury: &Treasury, now: Timestamp) -> TreasuryResult<()> {
        let schedule = &treasury.terms()?.schedule;
        if schedule.is_harvest_due(now, treasury.last_fee_harvest_time) {
            Ok(())
        } else {
            Err(TreasuryError::AlreadyHarvestedThisEpoch {
                next_allowed: treasury.last_fee_harvest_time.saturating_add(schedule.duration()),
            })
        }
    }

    /// Epoch information at `now`
    pub fn epoch_status(&self, treasury: &Treasury, now: Timestamp) -> TreasuryResult<EpochStatus> {
        let schedule = &treasury.terms()?.schedule;
        Ok(EpochStatus {
            epoch_index: schedule.epoch_index(now),
            current_epoch_start: schedule.current_epoch_start(now),
            next_epoch_start: schedule.next_epoch_start(now),
            period_to_next_epoch: schedule.period_to_next_epoch(now),
            pre_inform_open: schedule.is_in_pre_inform_window(now),
            harvest_due: schedule.is_harvest_due(now, treasury.last_fee_harvest_time),
            next_harvest_at: treasury.last_fee_harvest_time.saturating_add(schedule.duration()),
        })
    }

    /// Assess the fee owed at `sqrt_price` without changing anything
    pub fn assess_fee(
        &self,
        treasury: &Treasury,
        sqrt_price: SqrtPriceX96,
    ) -> TreasuryResult<FeeAssessment> {
        let terms = treasury.terms()?;
        fees::assess(
            &treasury.reserves,
            &treasury.baseline.reserves,
            sqrt_price,
            terms.fee_asset,
            terms.fee_rate,
        )
    }

    /// Permissionless harvest at the epoch boundary.
    ///
    /// Takes the fee from the fee-asset reserve and pays it to the fee
    /// recipient, then fulfils a pending intent whose epoch has rolled over.
    /// When that reserve cannot cover the fee (the trader rotated out of
    /// it) the fee is released pro rata from both reserves and the other
    /// leg is converted to the fee asset, as in [`TreasuryEngine::withdraw_fee`].
    pub fn harvest(
        &self,
        treasury: &Treasury,
        sqrt_price: SqrtPriceX96,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        let terms = treasury.terms()?;
        self.check_harvest_due(treasury, now)?;

        let assessment = self.assess_fee(treasury, sqrt_price)?;
        debug!(
            treasury_id = %treasury.id,
            nav = assessment.nav,
            baseline_nav = assessment.baseline_nav,
            fee = assessment.fee,
            "Fee assessed"
        );

        let mut next = treasury.clone();
        let mut events = Vec::new();
        let recipient = treasury.effective_fee_recipient()?.clone();

        let fee_leg = terms.fee_asset;
        let released = if treasury.reserves.get(fee_leg) >= assessment.fee {
            match fee_leg {
                Leg::A => Reserves::new(assessment.fee, 0),
                Leg::B => Reserves::new(0, assessment.fee),
            }
        } else {
            debug!(
                treasury_id = %treasury.id,
                available = treasury.reserves.get(fee_leg),
                fee = assessment.fee,
                "Fee asset reserve short, releasing pro rata"
            );
            fees::split_pro_rata(&treasury.reserves, &assessment)?
        };
        let mut actions = release_fee(&mut next, terms, &released, fee_leg, &recipient, 0)?;
        events.push(TreasuryEvent::FeeHarvested {
            treasury_id: treasury.id,
            trigger: HarvestTrigger::Automatic,
            profit: assessment.profit,
            fee: assessment.fee,
            paid_a: released.a,
            paid_b: released.b,
            recipient,
            sqrt_price,
            reserves: next.reserves,
            at: now,
        });

        let current = terms.schedule.current_epoch_start(now);
        if let Some(pending) = treasury.pending {
            if current > pending.recorded_epoch_start && current > treasury.last_withdraw_epoch_start
            {
                actions.extend(pay_out(
                    &mut next,
                    terms,
                    &terms.partner,
                    pending.amount_a,
                    pending.amount_b,
                )?);
                next.pending = None;
                next.last_withdraw_epoch_start = current;
                events.push(TreasuryEvent::Withdrawn {
                    treasury_id: treasury.id,
                    to: terms.partner.clone(),
                    amount_a: pending.amount_a,
                    amount_b: pending.amount_b,
                    remaining_a: 0,
                    remaining_b: 0,
                    reserves: next.reserves,
                    at: now,
                });
            }
        }

        roll_harvest_watermark(&mut next, terms, sqrt_price, now);
        Ok(Decision { treasury: next, actions, events })
    }

    /// Trader-initiated harvest paid out in a single asset.
    ///
    /// The fee is released from both reserves pro rata; the leg that is not
    /// `output_asset` is converted through the default venue with the
    /// proceeds sent directly to `recipient`.
    ///
    /// The minimum for the converted leg bounds the amount released from
    /// that reserve. The minimum for `output_asset` bounds the total the
    /// recipient receives, so the swap carries whatever the direct payment
    /// leaves uncovered and the executor rejects a short fill.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_fee(
        &self,
        treasury: &Treasury,
        caller: &Principal,
        min_out_a: Amount,
        min_out_b: Amount,
        output_asset: &AssetId,
        recipient: &Principal,
        sqrt_price: SqrtPriceX96,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        let terms = treasury.terms()?;
        terms.authorize(Role::Trader, caller)?;
        let output_leg = terms.assets.leg_of(output_asset)?;
        self.check_harvest_due(treasury, now)?;

        let assessment = self.assess_fee(treasury, sqrt_price)?;
        let released = fees::split_pro_rata(&treasury.reserves, &assessment)?;
        let min_out = |leg| match leg {
            Leg::A => min_out_a,
            Leg::B => min_out_b,
        };

        let convert_leg = output_leg.other();
        let converted = released.get(convert_leg);
        if converted < min_out(convert_leg) {
            return Err(TreasuryError::SlippageExceeded {
                leg: convert_leg,
                minimum: min_out(convert_leg),
                realized: converted,
            });
        }
        let direct = released.get(output_leg);
        let min_output = min_out(output_leg);
        if converted == 0 && direct < min_output {
            return Err(TreasuryError::SlippageExceeded {
                leg: output_leg,
                minimum: min_output,
                realized: direct,
            });
        }

        let mut next = treasury.clone();
        let actions = release_fee(
            &mut next,
            terms,
            &released,
            output_leg,
            recipient,
            min_output.saturating_sub(direct),
        )?;

        let event = TreasuryEvent::FeeHarvested {
            treasury_id: treasury.id,
            trigger: HarvestTrigger::Manual,
            profit: assessment.profit,
            fee: assessment.fee,
            paid_a: released.a,
            paid_b: released.b,
            recipient: recipient.clone(),
            sqrt_price,
            reserves: next.reserves,
            at: now,
        };

        roll_harvest_watermark(&mut next, terms, sqrt_price, now);
        Ok(Decision { treasury: next, actions, events: vec![event] })
    }

    /// Trader nominates the recipient of automatic harvests
    pub fn set_fee_recipient(
        &self,
        treasury: &Treasury,
        caller: &Principal,
        recipient: Principal,
        now: Timestamp,
    ) -> TreasuryResult<Decision> {
        treasury.terms()?.authorize(Role::Trader, caller)?;
        if recipient.is_empty() {
            return Err(TreasuryError::InvalidTerms("fee recipient must be set".to_string()));
        }

        let mut next = treasury.clone();
        next.fee_recipient = Some(recipient.clone());

        let event =
            TreasuryEvent::FeeRecipientChanged { treasury_id: treasury.id, recipient, at: now };
        Ok(Decision::state_only(next, event))
    }
}

/// Debit both reserves and emit the matching payments to `to`.
///
/// The baseline shrinks with the outflow so withdrawn capital is not
/// counted as a loss.
fn pay_out(
    next: &mut Treasury,
    terms: &TreasuryTerms,
    to: &Principal,
    amount_a: Amount,
    amount_b: Amount,
) -> TreasuryResult<Vec<EngineAction>> {
    let mut actions = Vec::new();
    for (leg, amount) in [(Leg::A, amount_a), (Leg::B, amount_b)] {
        if amount == 0 {
            continue;
        }
        next.reserves.debit(leg, amount)?;
        next.baseline.reserves.saturating_debit(leg, amount);
        actions.push(EngineAction::Pay {
            asset: terms.assets.get(leg).clone(),
            to: to.clone(),
            amount,
        });
    }
    Ok(actions)
}

/// Debit a released fee and pay it to `recipient` in `output_leg`.
///
/// The `output_leg` share is paid directly. The other share is sold
/// through the default venue with the proceeds forwarded to `recipient`,
/// and the fill must reach `min_converted`.
fn release_fee(
    next: &mut Treasury,
    terms: &TreasuryTerms,
    released: &Reserves,
    output_leg: Leg,
    recipient: &Principal,
    min_converted: Amount,
) -> TreasuryResult<Vec<EngineAction>> {
    next.reserves.debit(Leg::A, released.a)?;
    next.reserves.debit(Leg::B, released.b)?;

    let mut actions = Vec::new();
    let direct = released.get(output_leg);
    if direct > 0 {
        actions.push(EngineAction::Pay {
            asset: terms.assets.get(output_leg).clone(),
            to: recipient.clone(),
            amount: direct,
        });
    }
    let convert_leg = output_leg.other();
    let converted = released.get(convert_leg);
    if converted > 0 {
        actions.push(EngineAction::Swap(SwapOrder {
            router: terms.venue.clone(),
            asset_in: terms.assets.get(convert_leg).clone(),
            asset_out: terms.assets.get(output_leg).clone(),
            amount_in: converted,
            min_amount_out: min_converted,
            settlement: SwapSettlement::Forward { recipient: recipient.clone() },
        }));
    }
    Ok(actions)
}

/// Harvest watermarks land on the epoch boundary so a late harvest does
/// not push later ones off the grid.
fn roll_harvest_watermark(
    next: &mut Treasury,
    terms: &TreasuryTerms,
    sqrt_price: SqrtPriceX96,
    now: Timestamp,
) {
    next.last_fee_harvest_time = terms.schedule.current_epoch_start(now);
    next.baseline = Baseline { reserves: next.reserves, sqrt_price: Some(sqrt_price) };
}

// =============================================================================
// Tests
// =============================================================================
