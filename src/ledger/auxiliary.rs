//! Events outside the position lifecycle: settle prices, fee collection,
//! vault swaps and liquidity, pending amounts and the LP liquidity queue.

use alloy::primitives::{Address, U256};
use bigdecimal::BigDecimal;
use log::warn;
use num_traits::Zero;

use super::LedgerBatch;
use crate::{
    abis::{olp_manager, olp_queue, settle_price_feed, vault, vault_utils},
    db::models::{
        CollectedFee, FeeKind, LiquidityChange, LiquidityDirection, LiquidityQueueItem,
        PendingAmount, QueueStatus, SettlePrice, UsdgSwap,
    },
    error::LedgerError,
    utils::{
        address_key, scale_down, u256_to_bigdecimal, u256_to_u64, utc_date, ALERT_TARGET,
        PRICE_PRECISION,
    },
    worker::LogMeta,
};

impl LedgerBatch<'_> {
    pub(super) fn feed_settle_price(
        &mut self,
        meta: &LogMeta,
        e: &settle_price_feed::FeedSettlePrice,
    ) -> Result<(), LedgerError> {
        let expiry = u256_to_u64(e.expiry).ok_or_else(|| LedgerError::ValueOverflow {
            field: "expiry",
            value: e.expiry.to_string(),
        })?;

        self.settle_prices.push(SettlePrice {
            id: meta.log_id(),
            underlying_asset: address_key(&e.underlyingAsset),
            expiry,
            settle_price: u256_to_bigdecimal(e.settlePrice),
            process_block_time: meta.block_timestamp,
        });
        Ok(())
    }

    /// Vault fee collection. `account` is set for position fees only.
    pub(super) fn collect_fees(
        &mut self,
        meta: &LogMeta,
        account: Option<&Address>,
        token: &Address,
        fee_usd: U256,
        fee_amount: U256,
        is_settle: Option<bool>,
    ) {
        let ctx = self.ctx;
        let (kind, prefix) = match account {
            Some(_) => (FeeKind::Position, "positionFee"),
            None => (FeeKind::Protocol, "fee"),
        };
        let fee_usd = u256_to_bigdecimal(fee_usd);
        let fee_amount = u256_to_bigdecimal(fee_amount);

        self.fees.push(CollectedFee {
            id: meta.log_id(),
            kind,
            vault: address_key(&meta.address),
            account: account.map(address_key),
            token: address_key(token),
            fee_usd: fee_usd.clone(),
            fee_amount: fee_amount.clone(),
            is_settle,
            process_block_time: meta.block_timestamp,
        });

        let date = utc_date(meta.block_timestamp);
        let usd = fee_usd / &*PRICE_PRECISION;
        self.queue_counter(meta, format!("{}Usd:acc", prefix), &usd);
        self.queue_counter(meta, format!("{}Usd:{}", prefix, date), &usd);

        match ctx.token(token) {
            Some(info) => {
                let amount = scale_down(&fee_amount, info.decimals);
                self.queue_counter(
                    meta,
                    format!("{}Amount:{}:{}", prefix, date, info.ticker),
                    &amount,
                );
            },
            None => warn!(
                target: ALERT_TARGET,
                "Fee collected in unconfigured token {} at {}, amount not counted",
                token,
                meta.pointer()
            ),
        }
    }

    pub(super) fn buy_usdg(&mut self, meta: &LogMeta, e: &vault::BuyUSDG) {
        self.usdg_swaps.push(UsdgSwap {
            id: meta.log_id(),
            vault: address_key(&meta.address),
            is_buy: true,
            account: address_key(&e.account),
            token: address_key(&e.token),
            token_amount: u256_to_bigdecimal(e.tokenAmount),
            usdg_amount: u256_to_bigdecimal(e.usdgAmount),
            fee_basis_points: u256_to_bigdecimal(e.feeBasisPoints),
            process_block_time: meta.block_timestamp,
        });
    }

    pub(super) fn sell_usdg(&mut self, meta: &LogMeta, e: &vault::SellUSDG) {
        self.usdg_swaps.push(UsdgSwap {
            id: meta.log_id(),
            vault: address_key(&meta.address),
            is_buy: false,
            account: address_key(&e.account),
            token: address_key(&e.token),
            token_amount: u256_to_bigdecimal(e.tokenAmount),
            usdg_amount: u256_to_bigdecimal(e.usdgAmount),
            fee_basis_points: u256_to_bigdecimal(e.feeBasisPoints),
            process_block_time: meta.block_timestamp,
        });
    }

    /// LP token minted by the emitting manager, the zero address if unconfigured.
    fn olp_of(&self, manager: &Address) -> String {
        address_key(self.ctx.olp_of_manager(manager).unwrap_or(&Address::ZERO))
    }

    pub(super) fn add_liquidity(&mut self, meta: &LogMeta, e: &olp_manager::AddLiquidity) {
        self.liquidity_changes.push(LiquidityChange {
            id: meta.log_id(),
            direction: LiquidityDirection::Add,
            account: address_key(&e.account),
            olp: self.olp_of(&meta.address),
            token: address_key(&e.token),
            token_amount: u256_to_bigdecimal(e.amount),
            olp_amount: u256_to_bigdecimal(e.mintAmount),
            aum_in_usdg: u256_to_bigdecimal(e.aumInUsdg),
            olp_supply: u256_to_bigdecimal(e.olpSupply),
            usdg_amount: u256_to_bigdecimal(e.usdgAmount),
            process_block_time: meta.block_timestamp,
        });
    }

    pub(super) fn remove_liquidity(&mut self, meta: &LogMeta, e: &olp_manager::RemoveLiquidity) {
        self.liquidity_changes.push(LiquidityChange {
            id: meta.log_id(),
            direction: LiquidityDirection::Remove,
            account: address_key(&e.account),
            olp: self.olp_of(&meta.address),
            token: address_key(&e.token),
            token_amount: u256_to_bigdecimal(e.amountOut),
            olp_amount: u256_to_bigdecimal(e.olpAmount),
            aum_in_usdg: u256_to_bigdecimal(e.aumInUsdg),
            olp_supply: u256_to_bigdecimal(e.olpSupply),
            usdg_amount: u256_to_bigdecimal(e.usdgAmount),
            process_block_time: meta.block_timestamp,
        });
    }

    /// Pending amount row plus the `markPrice*` (type 0) or `riskPremium*`
    /// (type 1) counters. Other price types are only recorded.
    pub(super) fn notify_pending_amount(
        &mut self,
        meta: &LogMeta,
        e: &vault_utils::NotifyPendingAmount,
    ) {
        let ctx = self.ctx;
        let pending_usd = u256_to_bigdecimal(e.pendingUsd);
        let pending_amount = u256_to_bigdecimal(e.pendingAmount);

        self.pending_amounts.push(PendingAmount {
            id: meta.log_id(),
            vault_utils: address_key(&meta.address),
            price_type: e.priceType,
            token: address_key(&e.token),
            pending_usd: pending_usd.clone(),
            pending_amount: pending_amount.clone(),
            process_block_time: meta.block_timestamp,
        });

        let prefix = match e.priceType {
            0 => "markPrice",
            1 => "riskPremium",
            other => {
                warn!("Unknown pending price type {} at {}, not counted", other, meta.pointer());
                return;
            },
        };

        let date = utc_date(meta.block_timestamp);
        let usd = pending_usd / &*PRICE_PRECISION;
        self.queue_counter(meta, format!("{}Usd:acc", prefix), &usd);
        self.queue_counter(meta, format!("{}Usd:{}", prefix, date), &usd);
        if let Some(olp) = ctx.olp_name_of_vault_utils(&meta.address) {
            self.queue_counter(meta, format!("{}Usd:{}:acc", prefix, olp), &usd);
            self.queue_counter(meta, format!("{}Usd:{}:{}", prefix, olp, date), &usd);
        }

        match ctx.token(&e.token) {
            Some(info) => {
                let amount = scale_down(&pending_amount, info.decimals);
                self.queue_counter(
                    meta,
                    format!("{}Amount:{}:{}", prefix, date, info.ticker),
                    &amount,
                );
            },
            None => warn!(
                target: ALERT_TARGET,
                "Pending amount in unconfigured token {} at {}, amount not counted",
                e.token,
                meta.pointer()
            ),
        }
    }

    pub(super) fn enqueue_mint(&mut self, meta: &LogMeta, e: &olp_queue::EnqueuedMintAndStake) {
        self.enqueue(
            meta,
            QueuedAction {
                index: e.index,
                action_type: e.actionType,
                user: &e.user,
                token: &e.token,
                amount: e.amount,
                min_out: e.minOut,
                receiver: &e.receiver,
                is_native: e.isNative,
            },
        );
    }

    pub(super) fn enqueue_redeem(
        &mut self,
        meta: &LogMeta,
        e: &olp_queue::EnqueuedUnstakeAndRedeem,
    ) {
        self.enqueue(
            meta,
            QueuedAction {
                index: e.index,
                action_type: e.actionType,
                user: &e.user,
                token: &e.tokenOut,
                amount: e.olpAmount,
                min_out: e.minOut,
                receiver: &e.receiver,
                is_native: e.isNative,
            },
        );
    }

    fn enqueue(&mut self, meta: &LogMeta, action: QueuedAction<'_>) {
        let queue_address = address_key(&meta.address);
        let queue_index = action.index.to_string();
        let id = LiquidityQueueItem::key(&queue_address, &queue_index);

        self.queue_items.insert(
            id.clone(),
            LiquidityQueueItem {
                id: id.clone(),
                queue_address,
                queue_index,
                action_type: action.action_type,
                user: address_key(action.user),
                token: address_key(action.token),
                amount: u256_to_bigdecimal(action.amount),
                min_out: u256_to_bigdecimal(action.min_out),
                receiver: address_key(action.receiver),
                is_native: action.is_native,
                status: QueueStatus::Enqueued,
                amount_out: BigDecimal::zero(),
                olp_price: BigDecimal::zero(),
                cancel_reason: None,
                enqueued_block_time: meta.block_timestamp,
                process_block_time: 0,
            },
        );
        self.touch_queue_item(&id);
    }

    pub(super) fn process_queue_item(
        &mut self,
        meta: &LogMeta,
        e: &olp_queue::ProcessedQueueAction,
    ) {
        let id = LiquidityQueueItem::key(&address_key(&meta.address), &e.index.to_string());
        let Some(item) = self.queue_items.get_mut(&id) else {
            warn!("Processed unknown queue item {} at {}, skipping", id, meta.pointer());
            return;
        };

        item.status = QueueStatus::Processed;
        item.amount_out = u256_to_bigdecimal(e.amountOut);
        item.olp_price = u256_to_bigdecimal(e.olpPrice);
        item.process_block_time = meta.block_timestamp;
        self.touch_queue_item(&id);
    }

    pub(super) fn cancel_queue_item(
        &mut self,
        meta: &LogMeta,
        e: &olp_queue::CancelledQueueAction,
    ) {
        let id = LiquidityQueueItem::key(&address_key(&meta.address), &e.index.to_string());
        let Some(item) = self.queue_items.get_mut(&id) else {
            warn!("Cancelled unknown queue item {} at {}, skipping", id, meta.pointer());
            return;
        };

        item.status = QueueStatus::Cancelled;
        item.cancel_reason = Some(e.reason);
        item.process_block_time = meta.block_timestamp;
        self.touch_queue_item(&id);
    }
}

struct QueuedAction<'e> {
    index: U256,
    action_type: u8,
    user: &'e Address,
    token: &'e Address,
    amount: U256,
    min_out: U256,
    receiver: &'e Address,
    is_native: bool,
}
