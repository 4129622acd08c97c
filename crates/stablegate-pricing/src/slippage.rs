//! Basis-point slippage guard.

use stablegate_types::constants::BPS_DENOMINATOR;

/// Whether `observed` moved away from `reference` by more than `max_bps`
/// basis points.
///
/// Computed as `|observed - reference| * 10_000 > reference * max_bps` in
/// `i128`. A move of exactly `max_bps` passes. Non-positive rates always
/// count as excessive; otherwise a zero `max_bps` disables the check.
#[must_use]
pub fn exceeds_slippage(reference: i64, observed: i64, max_bps: u32) -> bool {
    if reference <= 0 || observed <= 0 {
        return true;
    }
    if max_bps == 0 {
        return false;
    }
    let diff = (i128::from(observed) - i128::from(reference)).abs();
    diff * i128::from(BPS_DENOMINATOR) > i128::from(reference) * i128::from(max_bps)
}
