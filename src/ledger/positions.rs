//! Position lifecycle handlers.

use alloy::primitives::{Address, U256};
use bigdecimal::BigDecimal;
use log::{debug, warn};
use num_traits::Zero;

use super::LedgerBatch;
use crate::{
    abis::{controller, options_token},
    db::models::{HistoryKind, Position, PositionHistory, RequestIndexWatermark},
    error::LedgerError,
    utils::{
        address_key, decode_option_id, merge_average, scale_down, u256_to_bigdecimal,
        PRICE_PRECISION,
    },
    worker::LogMeta,
};

/// Trade fill carried by Open and Close events, or synthesised from a transfer.
pub(super) struct Fill {
    account: Address,
    request_index: Option<BigDecimal>,
    option_token_id: U256,
    size: BigDecimal,
    is_buy: bool,
    quote_token: String,
    quote_amount: BigDecimal,
    collateral_token: String,
    collateral_amount: BigDecimal,
    execution_price: BigDecimal,
    spot_price: BigDecimal,
}

impl Fill {
    pub(super) fn open_buy(e: &controller::OpenBuyPosition) -> Self {
        Self {
            account: e.account,
            request_index: Some(u256_to_bigdecimal(e.requestIndex)),
            option_token_id: e.optionTokenId,
            size: u256_to_bigdecimal(e.size),
            is_buy: true,
            quote_token: address_key(&e.quoteToken),
            quote_amount: u256_to_bigdecimal(e.amountPaid),
            collateral_token: String::new(),
            collateral_amount: BigDecimal::zero(),
            execution_price: u256_to_bigdecimal(e.executionPrice),
            spot_price: u256_to_bigdecimal(e.spotPrice),
        }
    }

    pub(super) fn open_sell(e: &controller::OpenSellPosition) -> Self {
        Self {
            account: e.account,
            request_index: Some(u256_to_bigdecimal(e.requestIndex)),
            option_token_id: e.optionTokenId,
            size: u256_to_bigdecimal(e.size),
            is_buy: false,
            quote_token: address_key(&e.quoteToken),
            quote_amount: u256_to_bigdecimal(e.amountReceived),
            collateral_token: address_key(&e.collateralToken),
            collateral_amount: u256_to_bigdecimal(e.collateralAmount),
            execution_price: u256_to_bigdecimal(e.executionPrice),
            spot_price: u256_to_bigdecimal(e.spotPrice),
        }
    }

    pub(super) fn close_buy(e: &controller::CloseBuyPosition) -> Self {
        Self {
            account: e.account,
            request_index: Some(u256_to_bigdecimal(e.requestIndex)),
            option_token_id: e.optionTokenId,
            size: u256_to_bigdecimal(e.size),
            is_buy: true,
            quote_token: address_key(&e.quoteToken),
            quote_amount: u256_to_bigdecimal(e.amountReceived),
            collateral_token: String::new(),
            collateral_amount: BigDecimal::zero(),
            execution_price: u256_to_bigdecimal(e.executionPrice),
            spot_price: u256_to_bigdecimal(e.spotPrice),
        }
    }

    pub(super) fn close_sell(e: &controller::CloseSellPosition) -> Self {
        Self {
            account: e.account,
            request_index: Some(u256_to_bigdecimal(e.requestIndex)),
            option_token_id: e.optionTokenId,
            size: u256_to_bigdecimal(e.size),
            is_buy: false,
            quote_token: address_key(&e.quoteToken),
            quote_amount: u256_to_bigdecimal(e.amountPaid),
            collateral_token: address_key(&e.collateralToken),
            collateral_amount: u256_to_bigdecimal(e.collateralAmount),
            execution_price: u256_to_bigdecimal(e.executionPrice),
            spot_price: u256_to_bigdecimal(e.spotPrice),
        }
    }
}

pub(super) struct Settlement {
    account: Address,
    option_token_id: U256,
    size: BigDecimal,
    is_buy: bool,
    quote_token: String,
    quote_amount: BigDecimal,
    collateral_token: String,
    collateral_amount: BigDecimal,
    settle_price: BigDecimal,
}

impl Settlement {
    pub(super) fn buy(e: &controller::SettleBuyPosition) -> Self {
        Self {
            account: e.account,
            option_token_id: e.optionTokenId,
            size: u256_to_bigdecimal(e.size),
            is_buy: true,
            quote_token: address_key(&e.quoteToken),
            quote_amount: u256_to_bigdecimal(e.amountReceived),
            collateral_token: String::new(),
            collateral_amount: BigDecimal::zero(),
            settle_price: u256_to_bigdecimal(e.settlePrice),
        }
    }

    pub(super) fn sell(e: &controller::SettleSellPosition) -> Self {
        Self {
            account: e.account,
            option_token_id: e.optionTokenId,
            size: u256_to_bigdecimal(e.size),
            is_buy: false,
            quote_token: address_key(&e.quoteToken),
            quote_amount: u256_to_bigdecimal(e.amountPaid),
            collateral_token: address_key(&e.collateralToken),
            collateral_amount: u256_to_bigdecimal(e.collateralAmount),
            settle_price: u256_to_bigdecimal(e.settlePrice),
        }
    }
}

fn history_row(kind: HistoryKind, position: &Position, meta: &LogMeta) -> PositionHistory {
    let mut row = PositionHistory::blank(
        kind,
        &position.id,
        meta.block_number,
        meta.log_index,
        meta.tx_hash(),
        meta.block_timestamp,
    );
    row.account = position.account.clone();
    row.underlying_asset_index = position.underlying_asset_index;
    row.expiry = position.expiry;
    row.option_token_id = position.option_token_id.clone();
    row
}

/// `amount * part / whole`, truncated to token units. Zero when `whole` is zero.
fn pro_rate(amount: &BigDecimal, part: &BigDecimal, whole: &BigDecimal) -> BigDecimal {
    if whole.is_zero() {
        return BigDecimal::zero();
    }
    (amount * part / whole).with_scale(0)
}

/// Per-unit profit and return for a position exiting at `exit_price`.
fn profit_and_roi(
    is_buy: bool,
    exit_price: &BigDecimal,
    execution_price: &BigDecimal,
) -> (BigDecimal, BigDecimal) {
    let profit = if is_buy {
        exit_price - execution_price
    } else {
        execution_price - exit_price
    };
    let roi = if execution_price.is_zero() {
        BigDecimal::zero()
    } else {
        &profit / execution_price * BigDecimal::from(100)
    };
    (profit, roi)
}

impl LedgerBatch<'_> {
    pub(super) fn open(
        &mut self,
        meta: &LogMeta,
        fill: Fill,
        is_transfer: bool,
    ) -> Result<(), LedgerError> {
        let ctx = self.ctx;
        let option = decode_option_id(fill.option_token_id)?;
        let asset = ctx.asset(option.underlying_asset_index)?;
        let id = Position::key(&fill.account, &fill.option_token_id);

        let position = self.positions.entry(id.clone()).or_insert_with(|| {
            let mut position = Position::new(
                &fill.account,
                &fill.option_token_id,
                &option,
                &asset.ticker,
                fill.is_buy,
            );
            position.opened_token = fill.quote_token.clone();
            position.opened_collateral_token = fill.collateral_token.clone();
            position
        });

        let avg_before = position.opened_avg_execution_price.clone();
        // Opened averages cover every unit that entered the position.
        let inflow = &position.size_opened + &position.size_transferred_in;

        position.execution_price = merge_average(
            &position.size,
            &position.execution_price,
            &fill.size,
            &fill.execution_price,
        );
        position.opened_avg_execution_price = merge_average(
            &inflow,
            &position.opened_avg_execution_price,
            &fill.size,
            &fill.execution_price,
        );
        position.opened_avg_spot_price = merge_average(
            &inflow,
            &position.opened_avg_spot_price,
            &fill.size,
            &fill.spot_price,
        );

        position.size += &fill.size;
        if is_transfer {
            position.size_transferred_in += &fill.size;
        } else {
            position.size_opened += &fill.size;
        }
        position.opened_amount += &fill.quote_amount;
        position.opened_collateral_amount += &fill.collateral_amount;
        position.last_process_block_time = meta.block_timestamp;

        if !is_transfer {
            let units = scale_down(&fill.size, asset.decimals);
            let mut cash_flow = &units * &fill.execution_price;
            if fill.is_buy {
                cash_flow = -cash_flow;
            }

            let mut row = history_row(HistoryKind::Open, position, meta);
            row.request_index = fill.request_index.clone().unwrap_or_default();
            row.size = fill.size.clone();
            row.quote_token = fill.quote_token.clone();
            row.quote_amount = fill.quote_amount.clone();
            row.collateral_token = fill.collateral_token.clone();
            row.collateral_amount = fill.collateral_amount.clone();
            row.execution_price = fill.execution_price.clone();
            row.avg_execution_price = avg_before;
            row.spot_price = fill.spot_price.clone();
            row.cash_flow = cash_flow;
            self.history.push(row);
        }

        self.touch_position(&id);

        if is_transfer {
            return Ok(());
        }

        self.advance_watermark(meta, fill.request_index.as_ref());
        if !ctx.is_vault(&fill.account) {
            self.record_trade(meta, &option, &fill.size, &fill.spot_price, &fill.execution_price)?;
        }

        Ok(())
    }

    pub(super) fn close(&mut self, meta: &LogMeta, fill: Fill) -> Result<(), LedgerError> {
        let ctx = self.ctx;
        let id = Position::key(&fill.account, &fill.option_token_id);
        let Some(position) = self.positions.get_mut(&id) else {
            warn!("Close for unknown position {} at {}, skipping", id, meta.pointer());
            return Ok(());
        };

        let option = decode_option_id(fill.option_token_id)?;
        let asset = ctx.asset(option.underlying_asset_index)?;
        let is_vault = ctx.is_vault(&fill.account);

        let units = scale_down(&fill.size, asset.decimals);
        let (profit, roi) =
            profit_and_roi(fill.is_buy, &fill.execution_price, &position.execution_price);
        let mut cash_flow = &units * &fill.execution_price;
        if !fill.is_buy {
            cash_flow = -cash_flow;
        }

        let mut row = history_row(HistoryKind::Close, position, meta);
        row.request_index = fill.request_index.clone().unwrap_or_default();
        row.size = fill.size.clone();
        row.quote_token = fill.quote_token.clone();
        row.quote_amount = fill.quote_amount.clone();
        row.collateral_token = fill.collateral_token.clone();
        row.collateral_amount = fill.collateral_amount.clone();
        row.execution_price = fill.execution_price.clone();
        row.avg_execution_price = position.execution_price.clone();
        row.spot_price = fill.spot_price.clone();
        row.cash_flow = cash_flow;
        row.pnl = &units * &profit;
        row.roi = roi;
        self.history.push(row);

        if position.closed_token.is_empty() {
            position.closed_token = fill.quote_token.clone();
        }
        if position.closed_collateral_token.is_empty() {
            position.closed_collateral_token = fill.collateral_token.clone();
        }
        position.closed_avg_execution_price = merge_average(
            &position.size_closed,
            &position.closed_avg_execution_price,
            &fill.size,
            &fill.execution_price,
        );
        position.closed_avg_spot_price = merge_average(
            &position.size_closed,
            &position.closed_avg_spot_price,
            &fill.size,
            &fill.spot_price,
        );

        // Vaults close directly without a close request, so their size never
        // moved into size_closing.
        if is_vault {
            position.size -= &fill.size;
        } else {
            position.size_closing -= &fill.size;
        }
        position.size_closed += &fill.size;
        position.closed_amount += &fill.quote_amount;
        position.closed_collateral_amount += &fill.collateral_amount;
        position.last_process_block_time = meta.block_timestamp;

        self.touch_position(&id);
        self.advance_watermark(meta, fill.request_index.as_ref());
        if !is_vault {
            self.record_trade(meta, &option, &fill.size, &fill.spot_price, &fill.execution_price)?;
        }

        Ok(())
    }

    pub(super) fn settle(
        &mut self,
        meta: &LogMeta,
        settlement: Settlement,
    ) -> Result<(), LedgerError> {
        let ctx = self.ctx;
        let id = Position::key(&settlement.account, &settlement.option_token_id);
        let Some(position) = self.positions.get_mut(&id) else {
            warn!("Settle for unknown position {} at {}, skipping", id, meta.pointer());
            return Ok(());
        };

        let option = decode_option_id(settlement.option_token_id)?;
        let asset = ctx.asset(option.underlying_asset_index)?;

        let strike = BigDecimal::from(option.main_strike()) * &*PRICE_PRECISION;
        let distance = if option.strategy.is_call() {
            &settlement.settle_price - &strike
        } else {
            &strike - &settlement.settle_price
        };
        let payoff = if distance > BigDecimal::zero() {
            distance
        } else {
            BigDecimal::zero()
        };

        let units = scale_down(&settlement.size, asset.decimals);
        let (profit, roi) = profit_and_roi(settlement.is_buy, &payoff, &position.execution_price);
        let mut cash_flow = &units * &payoff;
        if !settlement.is_buy {
            cash_flow = -cash_flow;
        }

        let mut row = history_row(HistoryKind::Settle, position, meta);
        row.size = settlement.size.clone();
        row.quote_token = settlement.quote_token.clone();
        row.quote_amount = settlement.quote_amount.clone();
        row.collateral_token = settlement.collateral_token.clone();
        row.collateral_amount = settlement.collateral_amount.clone();
        row.avg_execution_price = position.execution_price.clone();
        row.settle_price = settlement.settle_price.clone();
        row.settle_payoff = payoff;
        row.cash_flow = cash_flow;
        row.pnl = &units * &profit;
        row.roi = roi;
        self.history.push(row);

        if position.settled_token.is_empty() {
            position.settled_token = settlement.quote_token.clone();
        }
        if position.settled_collateral_token.is_empty() {
            position.settled_collateral_token = settlement.collateral_token.clone();
        }
        position.settled_price = merge_average(
            &position.size_settled,
            &position.settled_price,
            &settlement.size,
            &settlement.settle_price,
        );
        position.size -= &settlement.size;
        position.size_settled += &settlement.size;
        position.settled_amount += &settlement.quote_amount;
        position.settled_collateral_amount += &settlement.collateral_amount;
        position.is_settled = true;
        position.last_process_block_time = meta.block_timestamp;

        self.touch_position(&id);
        Ok(())
    }

    /// Vault netting of two opposing positions it holds.
    pub(super) fn clear(
        &mut self,
        meta: &LogMeta,
        e: &controller::ClearPosition,
    ) -> Result<(), LedgerError> {
        let size = u256_to_bigdecimal(e.sizeToClear);
        let mut ids = vec![Position::key(&e.vault, &e.optionTokenId)];
        if e.oppositeOptionTokenId != e.optionTokenId {
            ids.push(Position::key(&e.vault, &e.oppositeOptionTokenId));
        }

        for id in ids {
            let Some(position) = self.positions.get_mut(&id) else {
                warn!("Clear for unknown position {} at {}, skipping", id, meta.pointer());
                continue;
            };

            let cleared_amount = pro_rate(&position.opened_amount, &size, &position.size);
            let cleared_collateral =
                pro_rate(&position.opened_collateral_amount, &size, &position.size);

            let mut row = history_row(HistoryKind::Clear, position, meta);
            row.size = size.clone();
            row.quote_token = position.opened_token.clone();
            row.quote_amount = cleared_amount.clone();
            row.collateral_token = position.opened_collateral_token.clone();
            row.collateral_amount = cleared_collateral.clone();
            row.execution_price = position.opened_avg_execution_price.clone();
            row.avg_execution_price = position.execution_price.clone();
            row.spot_price = position.opened_avg_spot_price.clone();
            self.history.push(row);

            position.closed_avg_execution_price = merge_average(
                &position.size_closed,
                &position.closed_avg_execution_price,
                &size,
                &position.opened_avg_execution_price,
            );
            position.closed_avg_spot_price = merge_average(
                &position.size_closed,
                &position.closed_avg_spot_price,
                &size,
                &position.opened_avg_spot_price,
            );
            position.size -= &size;
            position.size_closed += &size;
            position.closed_amount += cleared_amount;
            position.closed_collateral_amount += cleared_collateral;
            position.last_process_block_time = meta.block_timestamp;

            self.touch_position(&id);
        }

        Ok(())
    }

    /// ERC1155 move between two user accounts.
    pub(super) fn transfer(
        &mut self,
        meta: &LogMeta,
        e: &options_token::TransferSingle,
    ) -> Result<(), LedgerError> {
        let ctx = self.ctx;
        if e.from == e.to || ctx.is_transfer_exempt(&e.from) || ctx.is_transfer_exempt(&e.to) {
            return Ok(());
        }

        let from_id = Position::key(&e.from, &e.id);
        let Some(from) = self.positions.get_mut(&from_id) else {
            debug!("Transfer from untracked position {} at {}", from_id, meta.pointer());
            return Ok(());
        };

        let size = u256_to_bigdecimal(e.value);
        let (moved_amount, moved_collateral) = if from.is_buy {
            (pro_rate(&from.opened_amount, &size, &from.size), BigDecimal::zero())
        } else {
            (
                BigDecimal::zero(),
                pro_rate(&from.opened_collateral_amount, &size, &from.size),
            )
        };

        let fill = Fill {
            account: e.to,
            request_index: None,
            option_token_id: e.id,
            size: size.clone(),
            is_buy: from.is_buy,
            quote_token: from.opened_token.clone(),
            quote_amount: moved_amount.clone(),
            collateral_token: from.opened_collateral_token.clone(),
            collateral_amount: moved_collateral.clone(),
            execution_price: from.execution_price.clone(),
            spot_price: from.opened_avg_spot_price.clone(),
        };

        from.size -= &size;
        from.size_transferred_out += &size;
        from.opened_amount -= &moved_amount;
        from.opened_collateral_amount -= &moved_collateral;
        from.last_process_block_time = meta.block_timestamp;

        let mut out_row = history_row(HistoryKind::TransferOut, from, meta);
        out_row.request_index = BigDecimal::from(-1);
        out_row.size = size;
        out_row.quote_token = from.opened_token.clone();
        out_row.quote_amount = moved_amount;
        out_row.collateral_token = from.opened_collateral_token.clone();
        out_row.collateral_amount = moved_collateral;
        out_row.execution_price = from.execution_price.clone();
        out_row.avg_execution_price = from.execution_price.clone();
        out_row.spot_price = from.opened_avg_spot_price.clone();

        self.touch_position(&from_id);

        let to_id = Position::key(&e.to, &e.id);
        self.open(meta, fill, true)?;

        let mut in_row = out_row.clone();
        in_row.kind = HistoryKind::TransferIn;
        in_row.id = format!("{}-{}", to_id, meta.block_timestamp);
        in_row.position_id = to_id;
        in_row.account = address_key(&e.to);

        self.history.push(out_row);
        self.history.push(in_row);
        Ok(())
    }

    /// Close request moves size into the closing bucket until the keeper executes it.
    pub(super) fn request_close(
        &mut self,
        meta: &LogMeta,
        account: &Address,
        option_token_id: &U256,
        size: U256,
        request_index: Option<U256>,
    ) {
        let id = Position::key(account, option_token_id);
        let Some(position) = self.positions.get_mut(&id) else {
            warn!("Close request for unknown position {} at {}, skipping", id, meta.pointer());
            return;
        };

        let size = u256_to_bigdecimal(size);
        position.size -= &size;
        position.size_closing += &size;
        position.last_process_block_time = meta.block_timestamp;

        let mut row = history_row(HistoryKind::CloseRequested, position, meta);
        row.request_index = request_index.map(u256_to_bigdecimal).unwrap_or_default();
        row.size = size;
        row.avg_execution_price = position.execution_price.clone();
        self.history.push(row);

        self.touch_position(&id);
    }

    pub(super) fn cancel_close(
        &mut self,
        meta: &LogMeta,
        account: &Address,
        option_token_id: &U256,
        size: U256,
    ) {
        let id = Position::key(account, option_token_id);
        let Some(position) = self.positions.get_mut(&id) else {
            warn!("Close cancel for unknown position {} at {}, skipping", id, meta.pointer());
            return;
        };

        let size = u256_to_bigdecimal(size);
        position.size += &size;
        position.size_closing -= &size;
        position.last_process_block_time = meta.block_timestamp;

        let mut row = history_row(HistoryKind::CloseCancelled, position, meta);
        row.size = size;
        row.avg_execution_price = position.execution_price.clone();
        self.history.push(row);

        self.touch_position(&id);
    }

    fn advance_watermark(&mut self, meta: &LogMeta, request_index: Option<&BigDecimal>) {
        if let Some(request_index) = request_index {
            self.watermark = Some(RequestIndexWatermark {
                request_index: request_index.to_string(),
                process_block_time: meta.block_timestamp,
            });
        }
    }
}
