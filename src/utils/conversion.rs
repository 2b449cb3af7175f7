//! Type conversion and formatting utilities.
//!
//! Functions for converting chain integers (U256, Address) into the
//! decimal and string representations the ledger stores.

use std::str::FromStr;

use alloy::primitives::{hex, Address, U256};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_bigint::{BigInt, Sign};
use once_cell::sync::Lazy;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Lowercase hex form of an address, used as the account part of ledger keys.
pub fn address_key(address: &Address) -> String {
    hex_encode(address.as_slice())
}

// ============================================
// U256 Conversions
// ============================================

/// Convert U256 to an exact BigDecimal (no decimal adjustment).
pub fn u256_to_bigdecimal(value: U256) -> BigDecimal {
    // Via bytes (faster than string parsing)
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(Sign::Plus, &bytes);
    BigDecimal::from(big_int)
}

/// Narrow a U256 to u64, `None` when it does not fit.
pub fn u256_to_u64(value: U256) -> Option<u64> {
    u64::try_from(value).ok()
}

/// Divide a raw token amount by `10^decimals`.
pub fn scale_down(amount: &BigDecimal, decimals: u8) -> BigDecimal {
    if decimals == 0 {
        return amount.clone();
    }
    amount / big_pow10(decimals)
}

/// Parse a NUMERIC column read back as text.
pub fn parse_decimal(value: &str) -> anyhow::Result<BigDecimal> {
    BigDecimal::from_str(value).map_err(|e| anyhow::anyhow!("invalid numeric {:?}: {}", value, e))
}

/// Render a decimal for binding into a `$n::text::numeric` parameter.
pub fn decimal_text(value: &BigDecimal) -> String {
    value.normalized().to_plain_string()
}

// ============================================
// Dates
// ============================================

/// UTC calendar date (`YYYY-MM-DD`) of a unix timestamp.
pub fn utc_date(timestamp: u64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 31]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// On-chain prices carry 30 decimals.
pub static PRICE_PRECISION: Lazy<BigDecimal> = Lazy::new(|| big_pow10(30));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}
