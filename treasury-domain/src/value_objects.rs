//! Value Objects for the treasury domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use ethnum::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TreasuryError, TreasuryResult};

/// Token amount in the asset's smallest unit.
pub type Amount = u128;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Unique identifier for a treasury instance
pub type TreasuryId = uuid::Uuid;

// =============================================================================
// Principal
// =============================================================================

/// An account identity (partner, trader, owner, treasury, router, pool).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Create a principal from its account identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the account identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Privileged roles on a treasury
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Depositing partner; pre-informs and withdraws
    Partner,
    /// Trader; swaps and collects fees
    Trader,
    /// Operator; administrative reconciliation
    Owner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Partner => write!(f, "partner"),
            Role::Trader => write!(f, "trader"),
            Role::Owner => write!(f, "owner"),
        }
    }
}

// =============================================================================
// Assets
// =============================================================================

/// Identifier of a fungible asset
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create an asset identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an asset within the canonical pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    /// Lower identifier
    A,
    /// Higher identifier
    B,
}

impl Leg {
    /// The other leg of the pair
    pub fn other(self) -> Leg {
        match self {
            Leg::A => Leg::B,
            Leg::B => Leg::A,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::A => write!(f, "A"),
            Leg::B => write!(f, "B"),
        }
    }
}

/// Canonically ordered asset pair
///
/// # Invariants
/// - `a < b` (lexicographic identifier order)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    a: AssetId,
    b: AssetId,
}

impl AssetPair {
    /// Order two assets canonically
    ///
    /// # Errors
    /// Returns `TreasuryError::InvalidTerms` if both identifiers are equal
    pub fn new(x: AssetId, y: AssetId) -> TreasuryResult<Self> {
        if x == y {
            return Err(TreasuryError::InvalidTerms(format!("Asset pair must be distinct: {}", x)));
        }
        if x.as_str().is_empty() || y.as_str().is_empty() {
            return Err(TreasuryError::InvalidTerms("Asset identifiers must be non-empty".to_string()));
        }
        let (a, b) = if x < y { (x, y) } else { (y, x) };
        Ok(Self { a, b })
    }

    /// Asset A (lower identifier)
    pub fn a(&self) -> &AssetId {
        &self.a
    }

    /// Asset B (higher identifier)
    pub fn b(&self) -> &AssetId {
        &self.b
    }

    /// Asset at a leg
    pub fn get(&self, leg: Leg) -> &AssetId {
        match leg {
            Leg::A => &self.a,
            Leg::B => &self.b,
        }
    }

    /// Leg an asset occupies in this pair
    ///
    /// # Errors
    /// Returns `TreasuryError::UnknownAsset` for assets outside the pair
    pub fn leg_of(&self, asset: &AssetId) -> TreasuryResult<Leg> {
        if asset == &self.a {
            Ok(Leg::A)
        } else if asset == &self.b {
            Ok(Leg::B)
        } else {
            Err(TreasuryError::UnknownAsset(asset.to_string()))
        }
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.a, self.b)
    }
}

// =============================================================================
// FeeRate
// =============================================================================

/// Share of profit taken as performance fee
///
/// # Invariants
/// - 0 <= rate <= 1
/// - At most basis-point precision (0.0001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(Decimal);

impl FeeRate {
    /// Basis points in a whole
    pub const BPS_DENOMINATOR: u32 = 10_000;

    /// Create a fee rate from a fraction (0.2 = 20%)
    ///
    /// # Errors
    /// Returns `TreasuryError::InvalidTerms` if outside [0, 1] or finer than a basis point
    pub fn new(rate: Decimal) -> TreasuryResult<Self> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(TreasuryError::InvalidTerms(format!("Fee rate must be within [0, 1]: {}", rate)));
        }
        let bps = rate * Decimal::from(Self::BPS_DENOMINATOR);
        if bps.fract() != Decimal::ZERO {
            return Err(TreasuryError::InvalidTerms(format!(
                "Fee rate finer than one basis point: {}",
                rate
            )));
        }
        Ok(Self(rate))
    }

    /// Create a fee rate from a percentage (20 = 20%)
    pub fn from_percent(percent: Decimal) -> TreasuryResult<Self> {
        Self::new(percent / Decimal::ONE_HUNDRED)
    }

    /// Get the underlying fraction
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Rate in basis points
    pub fn bps(&self) -> u32 {
        (self.0 * Decimal::from(Self::BPS_DENOMINATOR)).to_u32().unwrap_or(0)
    }

    /// Apply the rate to an amount, rounding down
    pub fn apply(&self, amount: Amount) -> Amount {
        let scaled = U256::from(amount) * U256::from(self.bps()) / U256::from(Self::BPS_DENOMINATOR);
        // bps <= 10_000 so the result never exceeds `amount`
        scaled.as_u128()
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        Self(Decimal::new(20, 2)) // 20%
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0 * Decimal::ONE_HUNDRED)
    }
}

// =============================================================================
// Tests
// =============================================================================
