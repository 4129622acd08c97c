//! Fixed-point quantization of decimal amounts and rates.
//!
//! Amounts carry 6 fractional digits and rates carry 9. Conversion happens
//! exactly once at the engine boundary; from then on every ledger figure
//! is an `i64` count of units and all arithmetic is integer arithmetic.
//!
//! An input with more fractional digits than its scale is rejected rather
//! than rounded, so a caller can never lose value silently.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use stablegate_types::constants::{AMOUNT_DECIMALS, AMOUNT_SCALE, RATE_DECIMALS, RATE_SCALE};
use stablegate_types::{Result, StableGateError};

/// Convert a decimal amount into amount units (6 decimals).
///
/// # Errors
/// - `InvalidAmount` if `amount` is zero or negative
/// - `PrecisionLoss` if `amount` has more than 6 fractional digits
/// - `Overflow` if the scaled amount does not fit in `i64`
pub fn to_amount_units(amount: Decimal) -> Result<i64> {
    to_units(amount, AMOUNT_DECIMALS, AMOUNT_SCALE, "amount")
}

/// Convert a decimal exchange rate into rate units (9 decimals).
///
/// # Errors
/// Same contract as [`to_amount_units`] at the rate scale.
pub fn to_rate_units(rate: Decimal) -> Result<i64> {
    to_units(rate, RATE_DECIMALS, RATE_SCALE, "rate")
}

/// Exact inverse of [`to_amount_units`].
#[must_use]
pub fn from_amount_units(units: i64) -> Decimal {
    Decimal::new(units, AMOUNT_DECIMALS)
}

/// Exact inverse of [`to_rate_units`].
#[must_use]
pub fn from_rate_units(units: i64) -> Decimal {
    Decimal::new(units, RATE_DECIMALS)
}

fn to_units(value: Decimal, decimals: u32, scale: i64, what: &str) -> Result<i64> {
    if value <= Decimal::ZERO {
        return Err(StableGateError::InvalidAmount {
            reason: format!("{what} must be positive, got {value}"),
        });
    }
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    if rounded != value {
        return Err(StableGateError::PrecisionLoss {
            value: value.to_string(),
            decimals,
        });
    }
    let units = rounded
        .checked_mul(Decimal::from(scale))
        .and_then(|scaled| scaled.to_i64())
        .ok_or_else(|| StableGateError::Overflow(format!("{what} {value} exceeds unit range")))?;
    if units <= 0 {
        return Err(StableGateError::InvalidAmount {
            reason: format!("{what} must be positive, got {value}"),
        });
    }
    Ok(units)
}

/// `round(a * b / scale)` with round-half-away-from-zero, computed in
/// 128-bit integers so the intermediate product never overflows.
///
/// Used to turn `(amount_in, rate)` into `amount_out`:
/// `mul_div_round(amount_units, rate_units, RATE_SCALE)`.
///
/// # Errors
/// - `Internal` if `scale` is zero
/// - `Overflow` if the rounded quotient does not fit in `i64`
pub fn mul_div_round(a: i64, b: i64, scale: i64) -> Result<i64> {
    if scale == 0 {
        return Err(StableGateError::Internal("mul_div_round by zero scale".into()));
    }
    let numerator = i128::from(a) * i128::from(b);
    let denom = i128::from(scale);
    let mut quotient = numerator / denom;
    let remainder = numerator % denom;
    if remainder.abs() * 2 >= denom.abs() {
        if (numerator < 0) == (denom < 0) {
            quotient += 1;
        } else {
            quotient -= 1;
        }
    }
    i64::try_from(quotient)
        .map_err(|_| StableGateError::Overflow(format!("{a} * {b} / {scale} exceeds i64")))
}
