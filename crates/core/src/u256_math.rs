//! U256 fixed-point helpers for loan valuation.
//!
//! Ledger amounts stay in `U256` end to end so `collateral * price` never
//! overflows a machine integer. Conversions to `f64` are for ratios and
//! logging only.

use alloy::primitives::{I256, U256};

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Percent denominator
pub const PERCENT_DENOMINATOR: U256 = U256::from_limbs([100u64, 0, 0, 0]);

/// Quote currency decimals (prices and debt)
pub const QUOTE_DECIMALS: u8 = 6;

/// Largest supported collateral precision. Keeps `10^decimals` and
/// `amount * price` well inside `U256`.
pub const MAX_COLLATERAL_DECIMALS: u8 = 38;

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u64; 20] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
];

/// Fast power of 10 lookup
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if (exp as usize) < POW10.len() {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Value of `amount` collateral units in quote units.
///
/// Formula: amount * price / 10^collateral_decimals
///
/// Example: 200e18 units at price 1e6 with 18 decimals = 200e6
#[inline(always)]
pub fn collateral_value(amount: U256, price: U256, collateral_decimals: u8) -> U256 {
    if amount.is_zero() || price.is_zero() {
        return U256::ZERO;
    }
    amount.saturating_mul(price) / pow10(collateral_decimals)
}

/// Truncating ratio in basis points: numerator * 10000 / denominator.
///
/// Returns `None` when the denominator is zero.
#[inline(always)]
pub fn ratio_bps(numerator: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    Some(numerator.saturating_mul(BPS_DENOMINATOR) / denominator)
}

/// `value * percent / 100`, truncating.
#[inline(always)]
pub fn percent_of(value: U256, percent: u64) -> U256 {
    value.saturating_mul(U256::from(percent)) / PERCENT_DENOMINATOR
}

/// Signed difference `a - b`, clamped to the I256 range.
#[inline(always)]
pub fn signed_diff(a: U256, b: U256) -> I256 {
    let max = I256::MAX.into_raw();
    if a >= b {
        I256::from_raw((a - b).min(max))
    } else {
        -I256::from_raw((b - a).min(max))
    }
}

/// Convert U256 to f64.
/// Use only for ratios and display, not for computation.
#[inline(always)]
pub fn u256_to_f64(value: U256) -> f64 {
    if value <= U256::from(u128::MAX) {
        let v: u128 = value.to();
        v as f64
    } else {
        value
            .as_limbs()
            .iter()
            .rev()
            .fold(0.0, |acc, limb| acc * (u64::MAX as f64 + 1.0) + *limb as f64)
    }
}

/// Convert a basis-point ratio to a decimal factor (15000 bps = 1.5).
#[inline(always)]
pub fn bps_to_f64(bps: U256) -> f64 {
    u256_to_f64(bps) / 10_000.0
}

/// Convert a fixed-point amount to a decimal f64 for logging.
#[inline(always)]
pub fn to_decimal(amount: U256, decimals: u8) -> f64 {
    u256_to_f64(amount) / 10f64.powi(decimals as i32)
}
