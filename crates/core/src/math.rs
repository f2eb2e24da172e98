//! Uniswap V3 tick and sqrt-price math
//!
//! Pure functions turning raw pool state into decimal price ratios:
//! - `price_from_tick`: 1.0001^tick via `exp(tick * ln(1.0001))`
//! - `price_from_sqrt_x96`: sqrtPriceX96^2 / 2^192 in 512-bit integer space
//! - `normalize`: power-of-ten correction for token decimals
//!
//! The `_scaled` variants fold a power-of-ten exponent in before the value
//! becomes a `Decimal`, so tiny raw ratios keep their digits. A nonzero result
//! that would end up with fewer than [`MIN_SIGNIFICANT_DIGITS`] is an error,
//! never a truncated price.
//!
//! Tick math goes through f64 `exp`, so callers compare its output with a tolerance.

use alloy_primitives::{U256, U512};
use rust_decimal::prelude::*;

use crate::errors::{MathError, MathResult};

/// ln(1.0001), precomputed so every tick conversion shares the same rounding
pub const LN_1_0001: f64 = 0.00009999500033330835;

/// 2^192, the fixed-point denominator of a squared Q64.96 value
pub const Q192: U512 = U512::from_limbs([0, 0, 0, 1, 0, 0, 0, 0]);

/// Largest scale a `Decimal` can carry
pub const MAX_SCALE: u32 = 28;

/// Fewest significant digits a computed price may carry
pub const MIN_SIGNIFICANT_DIGITS: u32 = 15;

/// Largest power-of-ten shift the scaled conversions accept
pub const MAX_EXPONENT: u32 = 56;

/// Below this an f64 price cannot fill [`MIN_SIGNIFICANT_DIGITS`] at [`MAX_SCALE`]
const SMALLEST_PRECISE_F64: f64 = 1e-14;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Price ratio for a (possibly fractional, possibly negative) tick: 1.0001^tick
pub fn price_from_tick(tick: f64) -> MathResult<Decimal> {
    price_from_tick_scaled(tick, 0)
}

/// 1.0001^tick * 10^exponent, shifted in f64 before the decimal conversion
pub fn price_from_tick_scaled(tick: f64, exponent: i32) -> MathResult<Decimal> {
    if exponent.unsigned_abs() > MAX_EXPONENT {
        return Err(MathError::Overflow("price_from_tick"));
    }

    let ratio = (tick * LN_1_0001).exp() * 10f64.powi(exponent);
    if !ratio.is_finite() {
        return Err(MathError::NonFinite("price_from_tick"));
    }
    if ratio != 0.0 && ratio.abs() < SMALLEST_PRECISE_F64 {
        return Err(MathError::PrecisionLoss("price_from_tick"));
    }

    Decimal::from_f64(ratio).ok_or(MathError::Overflow("price_from_tick"))
}

/// Raw price ratio from a packed sqrtPriceX96: sqrtPriceX96^2 / 2^192
pub fn price_from_sqrt_x96(sqrt_price_x96: U256) -> MathResult<Decimal> {
    price_from_sqrt_x96_scaled(sqrt_price_x96, 0)
}

/// sqrtPriceX96^2 / 2^192 * 10^exponent, computed exactly in 512 bits
///
/// The quotient is truncated at the finest scale that still fits a `Decimal`
/// mantissa. Truncation is only accepted while it leaves at least
/// [`MIN_SIGNIFICANT_DIGITS`] digits.
pub fn price_from_sqrt_x96_scaled(sqrt_price_x96: U256, exponent: i32) -> MathResult<Decimal> {
    if sqrt_price_x96.is_zero() {
        return Ok(Decimal::ZERO);
    }

    let magnitude = exponent.unsigned_abs();
    if magnitude > MAX_EXPONENT {
        return Err(MathError::Overflow("price_from_sqrt_x96"));
    }

    let sqrt = U512::from(sqrt_price_x96);
    let squared = sqrt * sqrt;
    let shift = pow10(magnitude);

    let (numerator, denominator) = if exponent >= 0 {
        let numerator = squared
            .checked_mul(shift)
            .ok_or(MathError::Overflow("price_from_sqrt_x96"))?;
        (numerator, Q192)
    } else {
        (squared, Q192 * shift)
    };

    for scale in (0..=MAX_SCALE).rev() {
        let Some(scaled) = numerator.checked_mul(pow10(scale)) else {
            continue;
        };
        let (mantissa, remainder) = scaled.div_rem(denominator);

        let Some(mantissa) = u128::try_from(mantissa).ok() else {
            continue;
        };
        let fitted = i128::try_from(mantissa)
            .ok()
            .and_then(|m| Decimal::try_from_i128_with_scale(m, scale).ok());

        if let Some(price) = fitted {
            if !remainder.is_zero() && count_digits(mantissa) < MIN_SIGNIFICANT_DIGITS {
                return Err(MathError::PrecisionLoss("price_from_sqrt_x96"));
            }
            return Ok(price.normalize());
        }
    }

    Err(MathError::Overflow("price_from_sqrt_x96"))
}

/// Number of significant digits in a decimal, ignoring trailing zeros
pub fn significant_digits(value: Decimal) -> u32 {
    count_digits(value.normalize().mantissa().unsigned_abs())
}

fn count_digits(mut n: u128) -> u32 {
    let mut digits = 0;
    while n > 0 {
        n /= 10;
        digits += 1;
    }
    digits
}

fn pow10(exponent: u32) -> U512 {
    U512::from(10u8).pow(U512::from(exponent))
}

/// Scale a raw ratio by 10^(decimals1 - decimals0)
pub fn normalize(raw_price: Decimal, decimals0: u8, decimals1: u8) -> MathResult<Decimal> {
    let exponent = i32::from(decimals1) - i32::from(decimals0);
    scale_pow10(raw_price, exponent)
}

/// Multiply by 10^exponent; the exponent may be negative
pub fn scale_pow10(value: Decimal, exponent: i32) -> MathResult<Decimal> {
    if exponent == 0 {
        return Ok(value);
    }
    let magnitude = exponent.unsigned_abs();
    if magnitude > MAX_SCALE {
        return Err(MathError::Overflow("scale_pow10"));
    }

    let factor = if exponent > 0 {
        Decimal::try_from_i128_with_scale(10i128.pow(magnitude), 0)
    } else {
        Decimal::try_from_i128_with_scale(1, magnitude)
    }
    .map_err(|_| MathError::Overflow("scale_pow10"))?;

    value
        .checked_mul(factor)
        .ok_or(MathError::Overflow("scale_pow10"))
}

/// Percentage deviation of spot from TWAP: |spot - twap| / twap * 100
pub fn slippage_percent(spot: Decimal, twap: Decimal) -> MathResult<Decimal> {
    if twap.is_zero() {
        return Err(MathError::DivisionByZero);
    }

    spot.checked_sub(twap)
        .map(|diff| diff.abs())
        .and_then(|diff| diff.checked_div(twap))
        .and_then(|ratio| ratio.checked_mul(ONE_HUNDRED))
        .ok_or(MathError::Overflow("slippage_percent"))
}

/// Fixed-point string with exactly `precision` fractional digits
pub fn format_fixed(value: Decimal, precision: u32) -> String {
    let rounded = value.round_dp(precision);
    format!("{:.*}", precision as usize, rounded)
}
