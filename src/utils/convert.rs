use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Largest scale a `Decimal` can carry
const MAX_DECIMAL_SCALE: u8 = 28;

fn pow10(exp: u32) -> U256 {
    U256::from(10u8).pow(U256::from(exp))
}

/// Convert a display amount to the smallest on-chain unit, flooring any excess precision
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::UserInput("Amount must not be negative".to_string()));
    }
    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    Ok(mantissa * pow10(decimals as u32) / pow10(amount.scale()))
}

/// Convert smallest on-chain units back to a display amount
pub fn from_base_units(units: U256, decimals: u8) -> Decimal {
    let divisor = pow10(decimals as u32);
    let whole = units / divisor;
    let frac = units % divisor;

    let whole = match u128::try_from(whole)
        .ok()
        .and_then(|w| Decimal::try_from_i128_with_scale(w as i128, 0).ok())
    {
        Some(w) => w,
        None => return Decimal::MAX,
    };

    // Digits beyond what a Decimal can hold are dropped
    let (frac, scale) = if decimals > MAX_DECIMAL_SCALE {
        (
            frac / pow10((decimals - MAX_DECIMAL_SCALE) as u32),
            MAX_DECIMAL_SCALE,
        )
    } else {
        (frac, decimals)
    };
    let frac = u128::try_from(frac)
        .ok()
        .and_then(|f| Decimal::try_from_i128_with_scale(f as i128, scale as u32).ok())
        .unwrap_or_default();

    whole.checked_add(frac).unwrap_or(Decimal::MAX).normalize()
}

/// Multiply an integer amount by a decimal factor and floor the result.
/// Negative factors yield zero.
pub fn mul_decimal_floor(value: U256, factor: Decimal) -> U256 {
    if factor.is_sign_negative() || factor.is_zero() {
        return U256::ZERO;
    }
    let mantissa = U256::from(factor.mantissa().unsigned_abs());
    value.saturating_mul(mantissa) / pow10(factor.scale())
}

/// Convert gwei to wei
pub fn gwei_to_wei(gwei: u64) -> u128 {
    gwei as u128 * 1_000_000_000
}
