use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::str::FromStr;

/// Number of decimals used by TFUEL and every TNT-20 token this indexer
/// tracks. Raw on-chain amounts are wei-style fixed-point integers.
pub const TOKEN_DECIMALS: i64 = 18;

/// Converts a raw 18-decimal chain amount into a `BigDecimal` token amount.
pub fn wei_to_decimal(amount: U256) -> BigDecimal {
    // U256 -> BigInt via decimal string; U256 always formats as base-10 digits.
    let digits = BigInt::from_str(&amount.to_string()).expect("U256 is valid decimal");
    BigDecimal::new(digits, TOKEN_DECIMALS)
}

/// Converts an integer-valued chain field (ids, timestamps, counters) to i64,
/// failing on values that do not fit rather than silently truncating.
pub fn u256_to_i64(value: U256) -> Result<i64> {
    let limbs = value.as_limbs();
    if limbs[1] != 0 || limbs[2] != 0 || limbs[3] != 0 || limbs[0] > i64::MAX as u64 {
        return Err(anyhow!("chain value {} does not fit in i64", value));
    }
    Ok(limbs[0] as i64)
}

/// Canonical storage form for an address: lowercase, 0x-prefixed hex.
pub fn addr_hex(address: &Address) -> String {
    format!("{:#x}", address)
}
