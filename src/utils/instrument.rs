//! Human-readable instrument names derived from option identifiers.

use chrono::{DateTime, Utc};

use super::option_id::{OptionId, MAX_LEGS};

/// Expiry date in the exchange style, e.g. `8MAR24`.
pub fn format_expiry(expiry: u64) -> String {
    DateTime::<Utc>::from_timestamp(expiry as i64, 0)
        .map(|dt| dt.format("%-d%b%y").to_string().to_uppercase())
        .unwrap_or_default()
}

/// `BTC-8MAR24-60000-C`
pub fn instrument_name(ticker: &str, expiry: u64, strike_price: u64, is_call: bool) -> String {
    format!(
        "{}-{}-{}-{}",
        ticker,
        format_expiry(expiry),
        strike_price,
        if is_call { "C" } else { "P" }
    )
}

/// Comma-joined instrument names of all four leg slots (empty for unused slots).
pub fn option_names(ticker: &str, option: &OptionId) -> String {
    let active = option.active_legs();
    (0..MAX_LEGS)
        .map(|i| match active.get(i) {
            Some(leg) => instrument_name(ticker, option.expiry, leg.strike_price, leg.is_call),
            None => String::new(),
        })
        .collect::<Vec<_>>()
        .join(",")
}
