//! Q64.96 square-root prices.
//!
//! The venue reports prices as `sqrt(price) * 2^96` where `price` is the
//! amount of asset B per unit of asset A. All conversions here stay in
//! integer arithmetic; `Decimal` is only produced for display.

use ethnum::U256;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{TreasuryError, TreasuryResult};
use crate::value_objects::{Amount, Leg};

/// 2^96
pub const Q96: U256 = U256::from_words(0, 1u128 << 96);

/// Square-root price with 96 fractional bits.
///
/// # Invariants
/// - Non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SqrtPriceX96(U256);

impl SqrtPriceX96 {
    /// Wrap a raw Q64.96 value
    ///
    /// # Errors
    /// Returns `TreasuryError::InvalidTerms` for zero
    pub fn new(raw: U256) -> TreasuryResult<Self> {
        if raw == U256::ZERO {
            return Err(TreasuryError::InvalidTerms("Sqrt price must be non-zero".to_string()));
        }
        Ok(Self(raw))
    }

    /// Encode the price `amount_b / amount_a` (the venue's `encodePriceSqrt`)
    ///
    /// ```
    /// # use treasury_domain::price::{SqrtPriceX96, Q96};
    /// let one = SqrtPriceX96::from_ratio(1, 1).unwrap();
    /// assert_eq!(one.raw(), Q96);
    /// ```
    pub fn from_ratio(amount_b: Amount, amount_a: Amount) -> TreasuryResult<Self> {
        if amount_a == 0 || amount_b == 0 {
            return Err(TreasuryError::InvalidTerms("Price ratio terms must be non-zero".to_string()));
        }
        let ratio_x192 = U256::from(amount_b)
            .checked_mul(Q96)
            .and_then(|v| v.checked_mul(Q96))
            .ok_or(TreasuryError::MathOverflow("sqrt price ratio"))?
            / U256::from(amount_a);
        Self::new(isqrt(ratio_x192))
    }

    /// Raw Q64.96 value
    pub fn raw(&self) -> U256 {
        self.0
    }

    /// Value `amount_a` of asset A in units of asset B (rounded down)
    pub fn quote_a_in_b(&self, amount_a: Amount) -> TreasuryResult<U256> {
        let partial = U256::from(amount_a)
            .checked_mul(self.0)
            .ok_or(TreasuryError::MathOverflow("quote A in B"))?
            >> 96u32;
        Ok(partial.checked_mul(self.0).ok_or(TreasuryError::MathOverflow("quote A in B"))? >> 96u32)
    }

    /// Value `amount_b` of asset B in units of asset A (rounded down)
    pub fn quote_b_in_a(&self, amount_b: Amount) -> TreasuryResult<U256> {
        let partial = (U256::from(amount_b) * Q96) / self.0;
        Ok(partial.checked_mul(Q96).ok_or(TreasuryError::MathOverflow("quote B in A"))? / self.0)
    }

    /// Value of an amount held on `from` expressed in units of `into`
    pub fn quote(&self, amount: Amount, from: Leg, into: Leg) -> TreasuryResult<U256> {
        match (from, into) {
            (Leg::A, Leg::B) => self.quote_a_in_b(amount),
            (Leg::B, Leg::A) => self.quote_b_in_a(amount),
            _ => Ok(U256::from(amount)),
        }
    }

    /// Linear price (asset B per asset A) with 18 decimal places, for display
    pub fn to_price(&self) -> Option<Decimal> {
        let scale = U256::from(10u64.pow(18));
        let squared = self.0.checked_mul(self.0)?;
        // (sqrt^2 / 2^96) * 1e18 / 2^96 keeps the intermediate below 2^256
        let scaled = (squared >> 96u32).checked_mul(scale)? >> 96u32;
        if scaled > U256::from(i128::MAX as u128) {
            return None;
        }
        Decimal::try_from_i128_with_scale(scaled.as_u128() as i128, 18).ok().map(|d| d.normalize())
    }
}

impl fmt::Display for SqrtPriceX96 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SqrtPriceX96 {
    type Err = TreasuryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = U256::from_str_radix(s.trim(), 10)
            .map_err(|e| TreasuryError::InvalidTerms(format!("Invalid sqrt price {}: {}", s, e)))?;
        Self::new(raw)
    }
}

impl Serialize for SqrtPriceX96 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SqrtPriceX96 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Narrow a 256-bit intermediate back to an amount
pub fn to_amount(value: U256, what: &'static str) -> TreasuryResult<Amount> {
    if value > U256::from(u128::MAX) {
        return Err(TreasuryError::MathOverflow(what));
    }
    Ok(value.as_u128())
}

/// `a * b / denominator`, rounded down
pub fn mul_div(a: Amount, b: Amount, denominator: Amount) -> TreasuryResult<Amount> {
    if denominator == 0 {
        return Err(TreasuryError::MathOverflow("division by zero"));
    }
    to_amount(U256::from(a) * U256::from(b) / U256::from(denominator), "mul_div")
}

/// Integer square root (Newton's method)
fn isqrt(n: U256) -> U256 {
    if n < U256::from(2u8) {
        return n;
    }
    let mut x = n;
    let mut y = (x + U256::ONE) >> 1u32;
    while y < x {
        x = y;
        y = (x + n / x) >> 1u32;
    }
    x
}

// =============================================================================
// Tests
// =============================================================================
