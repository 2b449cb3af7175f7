//! Trading volume rollups: the daily aggregate row and the volume counters.

use bigdecimal::BigDecimal;

use super::LedgerBatch;
use crate::{
    db::models::DailyAggregate,
    error::LedgerError,
    utils::{instrument_name, scale_down, utc_date, OptionId, PRICE_PRECISION},
    worker::LogMeta,
};

fn option_type(is_call: bool) -> &'static str {
    if is_call {
        "Call"
    } else {
        "Put"
    }
}

impl LedgerBatch<'_> {
    /// Account a user trade of `size` units.
    ///
    /// Notional volume (`size * spot`) is counted once per leg, premium mass
    /// (`size * execution price`) once per trade.
    pub(super) fn record_trade(
        &mut self,
        meta: &LogMeta,
        option: &OptionId,
        size: &BigDecimal,
        spot_price: &BigDecimal,
        execution_price: &BigDecimal,
    ) -> Result<(), LedgerError> {
        let ctx = self.ctx;
        let asset = ctx.asset(option.underlying_asset_index)?;
        let ticker = asset.ticker.as_str();
        let date = utc_date(meta.block_timestamp);
        let vault = ctx.vault_name(option.source_vault_index);
        let expiry = option.expiry;

        let units = scale_down(size, asset.decimals);
        let notional = &units * spot_price / &*PRICE_PRECISION;
        let mass = &units * execution_price / &*PRICE_PRECISION;

        let daily = self
            .daily
            .entry(date.clone())
            .or_insert_with(|| DailyAggregate::new(date.clone(), option.underlying_asset_index));
        for _ in option.active_legs() {
            daily.accumulated_notional_volume += &notional;
        }
        daily.accumulated_execution_price += &mass;

        for leg in option.active_legs() {
            let kind = option_type(leg.is_call);
            let instrument = instrument_name(ticker, expiry, leg.strike_price, leg.is_call);

            self.queue_counter(meta, "volume:acc".to_string(), &notional);
            self.queue_counter(meta, format!("volume:{}", date), &notional);
            self.queue_counter(meta, format!("volume:{}:{}:{}", date, ticker, kind), &notional);
            self.queue_counter(meta, format!("volume:{}:{}:{}", expiry, ticker, kind), &notional);
            self.queue_counter(
                meta,
                format!("volume:{}:{}:{}:{}", vault, date, ticker, kind),
                &notional,
            );
            self.queue_counter(meta, format!("volume:{}", instrument), &notional);
        }

        let kind = option_type(option.strategy.is_call());
        self.queue_counter(meta, "executionPrice:acc".to_string(), &mass);
        self.queue_counter(meta, format!("executionPrice:{}", date), &mass);
        self.queue_counter(meta, format!("executionPrice:{}:{}:{}", date, ticker, kind), &mass);
        self.queue_counter(meta, format!("executionPrice:{}:{}:{}", expiry, ticker, kind), &mass);
        self.queue_counter(
            meta,
            format!("executionPrice:{}:{}:{}:{}", vault, date, ticker, kind),
            &mass,
        );

        Ok(())
    }
}
