//! Engine output: the new treasury state plus the external actions that
//! must succeed for it to take effect.

use serde::{Deserialize, Serialize};

use treasury_domain::{Amount, AssetId, Leg, Principal, Treasury, TreasuryEvent};

/// Where the proceeds of a swap go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SwapSettlement {
    /// Proceeds land in the treasury and are credited to a reserve
    CreditReserve {
        /// Reserve credited with the venue-reported amount
        leg: Leg,
    },
    /// Proceeds are sent straight to a third party
    Forward {
        /// Receiver of the output asset
        recipient: Principal,
    },
}

/// A single exact-input swap through a router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOrder {
    /// Router executing the swap
    pub router: Principal,
    /// Asset sold
    pub asset_in: AssetId,
    /// Asset bought
    pub asset_out: AssetId,
    /// Exact amount sold
    pub amount_in: Amount,
    /// Least output accepted from the venue; zero for trader swaps
    #[serde(default)]
    pub min_amount_out: Amount,
    /// Destination of the proceeds
    pub settlement: SwapSettlement,
}

/// External effect requested by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineAction {
    /// Pull an approved amount from a principal into the treasury
    Pull {
        /// Asset to pull
        asset: AssetId,
        /// Principal the amount is pulled from
        from: Principal,
        /// Amount to pull
        amount: Amount,
    },
    /// Pay an amount out of the treasury
    Pay {
        /// Asset to pay
        asset: AssetId,
        /// Receiver
        to: Principal,
        /// Amount to pay
        amount: Amount,
    },
    /// Approve the router and swap through it
    Swap(SwapOrder),
}

/// Outcome of an engine operation.
///
/// Nothing in a decision has happened yet: the executor runs `actions` in
/// order and persists `treasury` and `events` only if all of them succeed.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Treasury state once every action succeeds
    pub treasury: Treasury,
    /// External calls to perform, in order
    pub actions: Vec<EngineAction>,
    /// Events describing the transition
    pub events: Vec<TreasuryEvent>,
}

impl Decision {
    /// A decision with no external effects
    pub fn state_only(treasury: Treasury, event: TreasuryEvent) -> Self {
        Self { treasury, actions: Vec::new(), events: vec![event] }
    }
}
