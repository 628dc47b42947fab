//! Execution layer port definitions.
//!
//! Ports define the interfaces for the treasury's external collaborators
//! (asset transfers, swap venue, price oracle). Adapters implement these
//! ports for a specific chain or for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use treasury_domain::{Amount, AssetId, Principal, SqrtPriceX96};

use crate::error::ExecError;

// =============================================================================
// Asset Transfer Port
// =============================================================================

/// Port for fungible-asset movements.
///
/// Implementations:
/// - `StubAssetLedger` - In-memory balances with snapshot rollback
///
/// `begin`/`commit`/`rollback` bracket one treasury operation. Adapters
/// that cannot undo a transfer keep the no-op defaults; the executor only
/// persists state once every call of the operation has succeeded.
#[async_trait]
pub trait AssetTransferPort: Send + Sync {
    /// Allow `spender` to move up to `amount` of `owner`'s asset.
    async fn approve(
        &self,
        asset: &AssetId,
        owner: &Principal,
        spender: &Principal,
        amount: Amount,
    ) -> Result<(), ExecError>;

    /// Move `amount` from `from` to `to` using `spender`'s allowance.
    ///
    /// Fails if the allowance or the balance is insufficient.
    async fn transfer_from(
        &self,
        asset: &AssetId,
        spender: &Principal,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), ExecError>;

    /// Move `amount` from `from` (the caller's own account) to `to`.
    async fn transfer(
        &self,
        asset: &AssetId,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), ExecError>;

    /// Current balance of `account`.
    async fn balance_of(&self, asset: &AssetId, account: &Principal) -> Result<Amount, ExecError>;

    /// Begin an atomic batch of transfers
    async fn begin(&self) -> Result<(), ExecError> {
        Ok(()) // Default no-op for non-transactional adapters
    }

    /// Make the current batch permanent
    async fn commit(&self) -> Result<(), ExecError> {
        Ok(()) // Default no-op
    }

    /// Undo every transfer since `begin`
    async fn rollback(&self) -> Result<(), ExecError> {
        Ok(()) // Default no-op
    }
}

// =============================================================================
// Swap Venue Port
// =============================================================================

/// Exact-input single-hop swap parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Router executing the swap
    pub router: Principal,
    /// Asset sold
    pub asset_in: AssetId,
    /// Asset bought
    pub asset_out: AssetId,
    /// Pool fee tier, in hundredths of a basis point
    pub fee_tier: u32,
    /// Exact amount sold
    pub amount_in: Amount,
    /// Account the input is pulled from (must have approved the router)
    pub payer: Principal,
    /// Account receiving the output
    pub recipient: Principal,
}

/// Port for the external liquidity venue.
///
/// Implementations:
/// - `StubVenue` - Constant-product pool settled through `StubAssetLedger`
#[async_trait]
pub trait SwapVenuePort: Send + Sync {
    /// Swap exactly `amount_in` and return the amount delivered.
    async fn exact_input_swap(&self, request: &SwapRequest) -> Result<Amount, ExecError>;
}

// =============================================================================
// Price Oracle Port
// =============================================================================

/// Port for the pool price read.
///
/// Implementations:
/// - `StubOracle` - Settable price
#[async_trait]
pub trait PriceOraclePort: Send + Sync {
    /// Current `sqrt(price) * 2^96` of the pair, price being B per A.
    async fn sqrt_price_x96(
        &self,
        asset_a: &AssetId,
        asset_b: &AssetId,
    ) -> Result<SqrtPriceX96, ExecError>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_request_serialization() {
        let request = SwapRequest {
            router: Principal::new("router"),
            asset_in: AssetId::new("USDC"),
            asset_out: AssetId::new("WETH"),
            fee_tier: 3_000,
            amount_in: 3_000,
            payer: Principal::new("treasury"),
            recipient: Principal::new("treasury"),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: SwapRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, request);
    }
}
