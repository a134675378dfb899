//! Conversions between base-unit integers and human decimal amounts.

use alloy_primitives::U256;
use rust_decimal::Decimal;

use crate::{Error, Result};

/// Largest scale `Decimal` can represent.
const MAX_SCALE: u32 = 28;
/// Width of the `Decimal` mantissa.
const MAX_MANTISSA_BITS: usize = 96;

/// Decimals of the native gas token.
pub const NATIVE_DECIMALS: u8 = 18;

/// Convert a base-unit amount into a human decimal.
///
/// Digits beyond what `Decimal` can hold are truncated; an integer part
/// wider than 96 bits is an input error.
pub fn to_decimal(value: U256, decimals: u8) -> Result<Decimal> {
    let mut mantissa = value;
    let mut scale = decimals as u32;
    let ten = U256::from(10u64);

    while mantissa.bit_len() > MAX_MANTISSA_BITS || scale > MAX_SCALE {
        if scale == 0 {
            return Err(Error::Input(format!(
                "amount {} is too large to display",
                value
            )));
        }
        mantissa /= ten;
        scale -= 1;
    }

    Ok(Decimal::from_i128_with_scale(mantissa.to::<i128>(), scale).normalize())
}

/// Convert a human decimal into base units.
///
/// Negative amounts and amounts with more fractional digits than the token
/// supports are rejected.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(Error::Input(format!("amount {} is negative", amount)));
    }
    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > decimals as u32 {
        return Err(Error::Input(format!(
            "amount {} has more than {} decimal places",
            amount, decimals
        )));
    }

    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let factor = U256::from(10u64).pow(U256::from(decimals as u32 - scale));
    mantissa
        .checked_mul(factor)
        .ok_or_else(|| Error::Input(format!("amount {} overflows uint256", amount)))
}

/// Taker units received per maker unit, in human terms.
///
/// `None` when the making side is zero.
pub fn limit_price(making: Decimal, taking: Decimal) -> Option<Decimal> {
    if making.is_zero() {
        return None;
    }
    taking.checked_div(making).map(|p| p.normalize())
}

/// Wei as native currency.
pub fn format_native(wei: U256) -> Result<Decimal> {
    to_decimal(wei, NATIVE_DECIMALS)
}

/// Shorten a hex string for display: `0x1234...abcd`.
pub fn truncate_hex(value: &str) -> String {
    if value.len() <= 13 {
        return value.to_string();
    }
    match (value.get(..6), value.get(value.len() - 4..)) {
        (Some(head), Some(tail)) => format!("{}...{}", head, tail),
        _ => value.to_string(),
    }
}
