//! Performance fee assessment.
//!
//! Both harvest modes value the current reserves and the baseline reserves
//! at the same (current) venue price, in the fee asset. Only the increase
//! is charged:
//!
//! ```text
//! profit = nav(reserves) - nav(baseline)      (0 if negative)
//! fee    = floor(profit * fee_rate)
//! ```

use ethnum::U256;
use serde::{Deserialize, Serialize};

use treasury_domain::price::{mul_div, to_amount};
use treasury_domain::{Amount, FeeRate, Leg, Reserves, SqrtPriceX96, TreasuryResult};

/// Result of a fee assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeAssessment {
    /// Denomination of every figure below
    pub fee_asset: Leg,
    /// Price used for valuation
    pub sqrt_price: SqrtPriceX96,
    /// Value of the current reserves
    pub nav: Amount,
    /// Value of the baseline reserves
    pub baseline_nav: Amount,
    /// `nav - baseline_nav`, floored at zero
    pub profit: Amount,
    /// Fee owed
    pub fee: Amount,
}

/// Value of both reserves expressed in `in_leg`
pub fn nav(reserves: &Reserves, sqrt_price: &SqrtPriceX96, in_leg: Leg) -> TreasuryResult<Amount> {
    let other = in_leg.other();
    let converted = sqrt_price.quote(reserves.get(other), other, in_leg)?;
    let total = converted
        .checked_add(U256::from(reserves.get(in_leg)))
        .ok_or(treasury_domain::TreasuryError::MathOverflow("nav"))?;
    to_amount(total, "nav")
}

/// Assess the fee owed on `current` relative to `baseline`
pub fn assess(
    current: &Reserves,
    baseline: &Reserves,
    sqrt_price: SqrtPriceX96,
    fee_asset: Leg,
    fee_rate: FeeRate,
) -> TreasuryResult<FeeAssessment> {
    let nav_now = nav(current, &sqrt_price, fee_asset)?;
    let baseline_nav = nav(baseline, &sqrt_price, fee_asset)?;
    let profit = nav_now.saturating_sub(baseline_nav);

    Ok(FeeAssessment {
        fee_asset,
        sqrt_price,
        nav: nav_now,
        baseline_nav,
        profit,
        fee: fee_rate.apply(profit),
    })
}

/// Release the fee from both reserves in proportion to their share of NAV
///
/// Each leg gives up `reserve * fee / nav`, rounded down, so the released
/// value never exceeds the fee.
pub fn split_pro_rata(reserves: &Reserves, assessment: &FeeAssessment) -> TreasuryResult<Reserves> {
    if assessment.fee == 0 || assessment.nav == 0 {
        return Ok(Reserves::default());
    }
    Ok(Reserves::new(
        mul_div(reserves.a, assessment.fee, assessment.nav)?,
        mul_div(reserves.b, assessment.fee, assessment.nav)?,
    ))
}

// =============================================================================
// Tests
// =============================================================================
