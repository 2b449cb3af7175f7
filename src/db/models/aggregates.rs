use bigdecimal::BigDecimal;
use num_traits::Zero;

/// Daily trading rollup (PostgreSQL)
///
/// Primary Key: id = UTC date `YYYY-MM-DD`
/// Rows hold per-range deltas in memory; the store adds them onto the
/// persisted totals.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregate {
    pub id: String,
    pub underlying_asset_index: u16,
    pub accumulated_notional_volume: BigDecimal,
    pub accumulated_execution_price: BigDecimal,
}

impl DailyAggregate {
    pub fn new(id: String, underlying_asset_index: u16) -> Self {
        Self {
            id,
            underlying_asset_index,
            accumulated_notional_volume: BigDecimal::zero(),
            accumulated_execution_price: BigDecimal::zero(),
        }
    }
}

/// Latest processed request index (PostgreSQL singleton, mirrored to Redpanda)
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RequestIndexWatermark {
    pub request_index: String,
    pub process_block_time: u64,
}
