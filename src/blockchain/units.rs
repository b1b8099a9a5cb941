//! Conversions between display amounts and integer base units.

use ethers::types::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// `amount * 10^decimals`, truncated. `None` on negative input or overflow.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Option<u128> {
    if amount.is_sign_negative() {
        return None;
    }
    let scale = Decimal::try_from_i128_with_scale(10i128.checked_pow(decimals)?, 0).ok()?;
    amount.checked_mul(scale)?.trunc().to_u128()
}

/// `raw / 10^decimals`. `None` when the value does not fit a Decimal.
pub fn from_base_units(raw: u128, decimals: u32) -> Option<Decimal> {
    let raw = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(raw, decimals).ok().map(|d| d.normalize())
}

pub fn u256_from_base_units(amount: Decimal, decimals: u32) -> Option<U256> {
    to_base_units(amount, decimals).map(U256::from)
}

/// Parse a JSON-RPC quantity (`0x`-prefixed hex). `"0x"` is zero.
pub fn parse_hex_quantity(s: &str) -> Option<U256> {
    let body = s.trim().strip_prefix("0x").unwrap_or(s.trim());
    if body.is_empty() {
        return Some(U256::zero());
    }
    U256::from_str_radix(body, 16).ok()
}

pub fn u256_to_decimal(value: U256, decimals: u32) -> Option<Decimal> {
    if value > U256::from(u128::MAX) {
        return None;
    }
    from_base_units(value.as_u128(), decimals)
}
