//! # Fixed-Point Helpers
//!
//! Share conversions multiply two 18-decimal quantities before dividing,
//! and `1e20 * 1e20` does not fit in a `u128`. [`mul_div`] widens the
//! intermediate product to an arbitrary-precision integer so only the
//! final quotient has to fit.
//!
//! All rounding is toward zero. The vault never rounds in a user's favour.

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::config::{BPS_DENOMINATOR, MAX_ASSET_DECIMALS};
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Amount, Bps};

/// Computes `floor(a * b / denominator)`.
///
/// # Errors
///
/// [`ProtocolError::DivisionByZero`] if `denominator == 0`,
/// [`ProtocolError::MathOverflow`] if the quotient exceeds `u128::MAX`.
pub fn mul_div(a: Amount, b: Amount, denominator: Amount) -> ProtocolResult<Amount> {
    if denominator == 0 {
        return Err(ProtocolError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denominator);
    }
    let wide = BigUint::from(a) * BigUint::from(b) / BigUint::from(denominator);
    wide.to_u128().ok_or(ProtocolError::MathOverflow)
}

/// `floor(amount * bps / 10_000)`.
pub fn apply_bps(amount: Amount, bps: Bps) -> ProtocolResult<Amount> {
    mul_div(amount, Amount::from(bps), BPS_DENOMINATOR)
}

/// Relative gap between two values in basis points, `|a - b| * 10_000 / b`.
///
/// Returns `None` when `b == 0` and `a != 0`: any non-zero value is an
/// unbounded deviation from zero.
pub fn deviation_bps(a: Amount, b: Amount) -> ProtocolResult<Option<Amount>> {
    let diff = a.abs_diff(b);
    if b == 0 {
        return Ok(if diff == 0 { Some(0) } else { None });
    }
    mul_div(diff, BPS_DENOMINATOR, b).map(Some)
}

/// Scales a raw token amount with `decimals` places to 18-decimal fixed point.
///
/// # Errors
///
/// [`ProtocolError::UnsupportedDecimals`] above 18 decimals,
/// [`ProtocolError::MathOverflow`] if the scaled amount exceeds `u128::MAX`.
pub fn to_wad(amount: Amount, decimals: u8) -> ProtocolResult<Amount> {
    if decimals > MAX_ASSET_DECIMALS {
        return Err(ProtocolError::UnsupportedDecimals(decimals));
    }
    let scale = 10u128.pow(u32::from(MAX_ASSET_DECIMALS - decimals));
    amount.checked_mul(scale).ok_or(ProtocolError::MathOverflow)
}

/// Adds with overflow reported as [`ProtocolError::MathOverflow`].
pub fn checked_add(a: Amount, b: Amount) -> ProtocolResult<Amount> {
    a.checked_add(b).ok_or(ProtocolError::MathOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WAD;

    #[test]
    fn mul_div_small_values() {
        assert_eq!(mul_div(10, 3, 4).unwrap(), 7);
        assert_eq!(mul_div(0, 3, 4).unwrap(), 0);
    }

    #[test]
    fn mul_div_widens_intermediate() {
        // 1e20 * 1e20 overflows u128, the quotient does not.
        let big = 100 * WAD;
        assert_eq!(mul_div(big, big, big).unwrap(), big);
    }

    #[test]
    fn mul_div_rejects_zero_denominator() {
        assert_eq!(mul_div(1, 1, 0), Err(ProtocolError::DivisionByZero));
    }

    #[test]
    fn mul_div_reports_overflow() {
        assert_eq!(
            mul_div(u128::MAX, u128::MAX, 1),
            Err(ProtocolError::MathOverflow)
        );
    }

    #[test]
    fn apply_bps_floors() {
        assert_eq!(apply_bps(981_818_181_818_181_818, 5).unwrap(), 490_909_090_909_090);
        assert_eq!(apply_bps(WAD, 10_000).unwrap(), WAD);
        assert_eq!(apply_bps(9_999, 1).unwrap(), 0);
    }

    #[test]
    fn to_wad_scales_by_decimals() {
        assert_eq!(to_wad(1_000_000, 6).unwrap(), WAD);
        assert_eq!(to_wad(WAD, 18).unwrap(), WAD);
        assert_eq!(to_wad(1, 0).unwrap(), WAD);
        assert_eq!(to_wad(1, 19), Err(ProtocolError::UnsupportedDecimals(19)));
        assert_eq!(to_wad(u128::MAX, 17), Err(ProtocolError::MathOverflow));
    }

    #[test]
    fn deviation_against_zero() {
        assert_eq!(deviation_bps(0, 0).unwrap(), Some(0));
        assert_eq!(deviation_bps(1, 0).unwrap(), None);
        assert_eq!(deviation_bps(101 * WAD, 100 * WAD).unwrap(), Some(100));
        assert_eq!(deviation_bps(99 * WAD, 100 * WAD).unwrap(), Some(100));
    }
}
