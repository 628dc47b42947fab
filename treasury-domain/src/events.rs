//! Domain Events for the epoch treasury
//!
//! Every successful operation emits one or more events. They are appended
//! to the event log after the operation commits and form the audit trail.

use serde::{Deserialize, Serialize};

use crate::entities::{Reserves, TreasuryTerms};
use crate::price::SqrtPriceX96;
use crate::value_objects::{Amount, AssetId, Principal, Timestamp, TreasuryId};

/// How a fee harvest was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestTrigger {
    /// Permissionless harvest at the epoch boundary
    Automatic,
    /// Trader-initiated `withdraw_fee`
    Manual,
}

/// Treasury lifecycle events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreasuryEvent {
    /// Treasury moved from uninitialized to active
    Initialized {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// Terms fixed at initialization
        terms: TreasuryTerms,
        /// When initialization happened
        at: Timestamp,
    },

    /// Assets pulled from a depositor into the reserves
    Deposited {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// Depositor
        from: Principal,
        /// Amount of asset A
        amount_a: Amount,
        /// Amount of asset B
        amount_b: Amount,
        /// Reserves after the deposit
        reserves: Reserves,
        /// When the deposit happened
        at: Timestamp,
    },

    /// Partner declared a withdrawal intent
    PreInformed {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// Requested amount of asset A
        amount_a: Amount,
        /// Requested amount of asset B
        amount_b: Amount,
        /// Epoch in which the intent was recorded
        epoch_start: Timestamp,
        /// When the intent was recorded
        at: Timestamp,
    },

    /// Assets paid out to the partner
    Withdrawn {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// Receiving partner
        to: Principal,
        /// Amount of asset A
        amount_a: Amount,
        /// Amount of asset B
        amount_b: Amount,
        /// Pending amounts left after the withdrawal
        remaining_a: Amount,
        /// Pending amount of asset B left after the withdrawal
        remaining_b: Amount,
        /// Reserves after the withdrawal
        reserves: Reserves,
        /// When the withdrawal happened
        at: Timestamp,
    },

    /// Reserve asset exchanged through the venue
    Swapped {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// Router used
        router: Principal,
        /// Asset sold
        asset_in: AssetId,
        /// Asset bought
        asset_out: AssetId,
        /// Amount sold
        amount_in: Amount,
        /// Amount reported by the venue
        amount_out: Amount,
        /// Reserves after the swap
        reserves: Reserves,
        /// When the swap happened
        at: Timestamp,
    },

    /// Performance fee taken from the reserves
    FeeHarvested {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// How the harvest was triggered
        trigger: HarvestTrigger,
        /// Profit since the baseline, in the fee asset
        profit: Amount,
        /// Fee taken, in the fee asset
        fee: Amount,
        /// Amount of asset A released from the reserves
        paid_a: Amount,
        /// Amount of asset B released from the reserves
        paid_b: Amount,
        /// Fee recipient
        recipient: Principal,
        /// Price the assessment used
        sqrt_price: SqrtPriceX96,
        /// Reserves after the harvest
        reserves: Reserves,
        /// When the harvest happened
        at: Timestamp,
    },

    /// Manual fee leg converted into the requested output asset
    FeeConverted {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// Asset sold
        asset_in: AssetId,
        /// Requested output asset
        asset_out: AssetId,
        /// Amount sold
        amount_in: Amount,
        /// Amount delivered to the recipient
        amount_out: Amount,
        /// Fee recipient
        recipient: Principal,
        /// When the conversion happened
        at: Timestamp,
    },

    /// Trader nominated a new recipient for automatic harvests
    FeeRecipientChanged {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// New recipient
        recipient: Principal,
        /// When the change happened
        at: Timestamp,
    },

    /// Reserves reconciled against observed balances
    ReservesSynced {
        /// Treasury identifier
        treasury_id: TreasuryId,
        /// Reserves before the sync
        previous: Reserves,
        /// Reserves after the sync
        reserves: Reserves,
        /// When the sync happened
        at: Timestamp,
    },
}

impl TreasuryEvent {
    /// Get the treasury ID from any event
    pub fn treasury_id(&self) -> TreasuryId {
        match self {
            TreasuryEvent::Initialized { treasury_id, .. }
            | TreasuryEvent::Deposited { treasury_id, .. }
            | TreasuryEvent::PreInformed { treasury_id, .. }
            | TreasuryEvent::Withdrawn { treasury_id, .. }
            | TreasuryEvent::Swapped { treasury_id, .. }
            | TreasuryEvent::FeeHarvested { treasury_id, .. }
            | TreasuryEvent::FeeConverted { treasury_id, .. }
            | TreasuryEvent::FeeRecipientChanged { treasury_id, .. }
            | TreasuryEvent::ReservesSynced { treasury_id, .. } => *treasury_id,
        }
    }

    /// Get the timestamp from any event
    pub fn at(&self) -> Timestamp {
        match self {
            TreasuryEvent::Initialized { at, .. }
            | TreasuryEvent::Deposited { at, .. }
            | TreasuryEvent::PreInformed { at, .. }
            | TreasuryEvent::Withdrawn { at, .. }
            | TreasuryEvent::Swapped { at, .. }
            | TreasuryEvent::FeeHarvested { at, .. }
            | TreasuryEvent::FeeConverted { at, .. }
            | TreasuryEvent::FeeRecipientChanged { at, .. }
            | TreasuryEvent::ReservesSynced { at, .. } => *at,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            TreasuryEvent::Initialized { .. } => "initialized",
            TreasuryEvent::Deposited { .. } => "deposited",
            TreasuryEvent::PreInformed { .. } => "pre_informed",
            TreasuryEvent::Withdrawn { .. } => "withdrawn",
            TreasuryEvent::Swapped { .. } => "swapped",
            TreasuryEvent::FeeHarvested { .. } => "fee_harvested",
            TreasuryEvent::FeeConverted { .. } => "fee_converted",
            TreasuryEvent::FeeRecipientChanged { .. } => "fee_recipient_changed",
            TreasuryEvent::ReservesSynced { .. } => "reserves_synced",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
