//! Utility functions for the options ledger.
//!
//! This module is organized into focused submodules:
//!
//! - [`conversion`] - Type conversions (U256, BigDecimal, hex encoding, dates)
//! - [`option_id`] - Packed option identifier codec
//! - [`average`] - Size-weighted running averages
//! - [`instrument`] - Instrument names derived from option identifiers

pub mod average;
pub mod conversion;
pub mod instrument;
pub mod option_id;

// ============================================
// Common Constants
// ============================================

/// Log target for records that need an operator's attention.
pub const ALERT_TARGET: &str = "alert";

// ============================================
// Re-exports
// ============================================

pub use average::merge_average;
pub use conversion::{
    address_key, decimal_text, hex_encode, parse_decimal, scale_down, u256_to_bigdecimal,
    u256_to_u64, utc_date, PRICE_PRECISION,
};
pub use instrument::{format_expiry, instrument_name, option_names};
pub use option_id::{
    decode_option_id, determine_strategy, encode_option_id, Leg, OptionId, OptionIdError,
    Strategy,
};
