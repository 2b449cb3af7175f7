//! Position ledger state machine.
//!
//! A [`LedgerBatch`] is the unit of work of one block range: it is seeded with
//! the persisted rows the range touches, applies every decoded event in chain
//! order and yields the resulting [`RangeChanges`] for a single commit. The
//! batch never touches storage itself, so dropping it discards the range.

mod auxiliary;
mod positions;
mod volume;

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use anyhow::Context;
use bigdecimal::BigDecimal;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    config::Settings,
    db::{
        models::{
            CollectedFee, CounterIntent, DailyAggregate, LiquidityChange, LiquidityQueueItem,
            PendingAmount, Position, PositionHistory, RequestIndexWatermark, SettlePrice,
            UsdgSwap,
        },
        RangeChanges,
    },
    error::LedgerError,
    utils::address_key,
    worker::{DecodedLog, LedgerEvent, LogMeta, LogPointer},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub ticker: String,
    pub decimals: u8,
}

/// Static protocol knowledge the handlers need: assets, tokens and the
/// protocol-owned accounts.
#[derive(Debug, Clone)]
pub struct LedgerContext {
    assets: FxHashMap<u16, AssetInfo>,
    tokens: FxHashMap<Address, AssetInfo>,
    /// Vaults in source-vault-index order
    vaults: Vec<(Address, String)>,
    /// Parties whose option token moves are mints, burns or escrow
    transfer_exempt: FxHashSet<Address>,
    /// OLP manager → LP token it mints
    olp_managers: FxHashMap<Address, Address>,
    /// Vault utils → LP token name used in counter keys
    vault_utils: FxHashMap<Address, String>,
}

impl LedgerContext {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let parse = |value: &str| -> anyhow::Result<Address> {
            value
                .parse()
                .with_context(|| format!("Invalid address {}", value))
        };

        let mut assets = FxHashMap::default();
        let mut tokens = FxHashMap::default();
        for asset in &settings.assets {
            let info = AssetInfo {
                ticker: asset.ticker.clone(),
                decimals: asset.decimals,
            };
            tokens.insert(parse(&asset.address)?, info.clone());
            assets.insert(asset.index, info);
        }
        for token in &settings.tokens {
            tokens.insert(
                parse(&token.address)?,
                AssetInfo {
                    ticker: token.ticker.clone(),
                    decimals: token.decimals,
                },
            );
        }

        let vaults = settings
            .contracts
            .vaults
            .iter()
            .map(|vault| Ok((parse(&vault.address)?, vault.name.clone())))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut olp_managers = FxHashMap::default();
        let mut vault_utils = FxHashMap::default();
        for olp in settings.contracts.vaults.iter().filter_map(|v| v.olp.as_ref()) {
            olp_managers.insert(parse(&olp.manager)?, parse(&olp.address)?);
            vault_utils.insert(parse(&olp.vault_utils)?, olp.name.clone());
        }

        let mut transfer_exempt = FxHashSet::default();
        transfer_exempt.insert(Address::ZERO);
        transfer_exempt.insert(parse(&settings.contracts.position_manager)?);
        transfer_exempt.insert(parse(&settings.contracts.settle_manager)?);
        transfer_exempt.extend(vaults.iter().map(|(address, _)| *address));

        Ok(Self {
            assets,
            tokens,
            vaults,
            transfer_exempt,
            olp_managers,
            vault_utils,
        })
    }

    pub fn asset(&self, index: u16) -> Result<&AssetInfo, LedgerError> {
        self.assets
            .get(&index)
            .ok_or(LedgerError::UnknownAsset(index))
    }

    pub fn token(&self, address: &Address) -> Option<&AssetInfo> {
        self.tokens.get(address)
    }

    pub fn is_vault(&self, account: &Address) -> bool {
        self.vaults.iter().any(|(address, _)| address == account)
    }

    pub fn vault_name(&self, index: u8) -> String {
        self.vaults
            .get(index as usize)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| format!("vault{}", index))
    }

    pub fn is_transfer_exempt(&self, account: &Address) -> bool {
        self.transfer_exempt.contains(account)
    }

    pub fn olp_of_manager(&self, manager: &Address) -> Option<&Address> {
        self.olp_managers.get(manager)
    }

    pub fn olp_name_of_vault_utils(&self, vault_utils: &Address) -> Option<&str> {
        self.vault_utils.get(vault_utils).map(String::as_str)
    }
}

/// Persisted rows a range must load before its events can be applied.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RangeKeys {
    pub positions: Vec<String>,
    pub queue_items: Vec<String>,
}

pub fn referenced_keys(logs: &[DecodedLog]) -> RangeKeys {
    let mut positions = Vec::new();
    let mut queue_items = Vec::new();

    for log in logs {
        let mut position = |account: &Address, id: &U256| positions.push(Position::key(account, id));
        match &log.event {
            LedgerEvent::OpenBuy(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::OpenSell(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::CloseBuy(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::CloseSell(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::SettleBuy(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::SettleSell(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::CreateClose(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::CancelClose(e) => position(&e.account, &e.optionTokenId),
            LedgerEvent::Clear(e) => {
                position(&e.vault, &e.optionTokenId);
                position(&e.vault, &e.oppositeOptionTokenId);
            },
            LedgerEvent::Transfer(e) => {
                position(&e.from, &e.id);
                position(&e.to, &e.id);
            },
            LedgerEvent::ProcessedQueueAction(e) => queue_items.push(LiquidityQueueItem::key(
                &address_key(&log.meta.address),
                &e.index.to_string(),
            )),
            LedgerEvent::CancelledQueueAction(e) => queue_items.push(LiquidityQueueItem::key(
                &address_key(&log.meta.address),
                &e.index.to_string(),
            )),
            LedgerEvent::FeedSettlePrice(_)
            | LedgerEvent::CollectFees(_)
            | LedgerEvent::CollectPositionFees(_)
            | LedgerEvent::BuyUsdg(_)
            | LedgerEvent::SellUsdg(_)
            | LedgerEvent::AddLiquidity(_)
            | LedgerEvent::RemoveLiquidity(_)
            | LedgerEvent::NotifyPendingAmount(_)
            | LedgerEvent::EnqueuedMintAndStake(_)
            | LedgerEvent::EnqueuedUnstakeAndRedeem(_) => {},
        }
    }

    positions.sort_unstable();
    positions.dedup();
    queue_items.sort_unstable();
    queue_items.dedup();

    RangeKeys {
        positions,
        queue_items,
    }
}

/// In-memory unit of work for one block range.
pub struct LedgerBatch<'a> {
    ctx: &'a LedgerContext,
    positions: FxHashMap<String, Position>,
    touched_positions: Vec<String>,
    history: Vec<PositionHistory>,
    daily: BTreeMap<String, DailyAggregate>,
    watermark: Option<RequestIndexWatermark>,
    counters: Vec<CounterIntent>,
    counter_seq: Option<(LogPointer, u32)>,
    settle_prices: Vec<SettlePrice>,
    fees: Vec<CollectedFee>,
    queue_items: FxHashMap<String, LiquidityQueueItem>,
    touched_queue_items: Vec<String>,
    usdg_swaps: Vec<UsdgSwap>,
    liquidity_changes: Vec<LiquidityChange>,
    pending_amounts: Vec<PendingAmount>,
}

impl<'a> LedgerBatch<'a> {
    pub fn new(
        ctx: &'a LedgerContext,
        positions: Vec<Position>,
        queue_items: Vec<LiquidityQueueItem>,
    ) -> Self {
        Self {
            ctx,
            positions: positions.into_iter().map(|p| (p.id.clone(), p)).collect(),
            touched_positions: Vec::new(),
            history: Vec::new(),
            daily: BTreeMap::new(),
            watermark: None,
            counters: Vec::new(),
            counter_seq: None,
            settle_prices: Vec::new(),
            fees: Vec::new(),
            queue_items: queue_items.into_iter().map(|q| (q.id.clone(), q)).collect(),
            touched_queue_items: Vec::new(),
            usdg_swaps: Vec::new(),
            liquidity_changes: Vec::new(),
            pending_amounts: Vec::new(),
        }
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn history(&self) -> &[PositionHistory] {
        &self.history
    }

    /// Apply one decoded event.
    pub fn apply(&mut self, log: &DecodedLog) -> Result<(), LedgerError> {
        let meta = &log.meta;
        match &log.event {
            LedgerEvent::OpenBuy(e) => self.open(meta, positions::Fill::open_buy(e), false),
            LedgerEvent::OpenSell(e) => self.open(meta, positions::Fill::open_sell(e), false),
            LedgerEvent::CloseBuy(e) => self.close(meta, positions::Fill::close_buy(e)),
            LedgerEvent::CloseSell(e) => self.close(meta, positions::Fill::close_sell(e)),
            LedgerEvent::SettleBuy(e) => self.settle(meta, positions::Settlement::buy(e)),
            LedgerEvent::SettleSell(e) => self.settle(meta, positions::Settlement::sell(e)),
            LedgerEvent::Clear(e) => self.clear(meta, e),
            LedgerEvent::CreateClose(e) => {
                self.request_close(meta, &e.account, &e.optionTokenId, e.size, Some(e.index));
                Ok(())
            },
            LedgerEvent::CancelClose(e) => {
                self.cancel_close(meta, &e.account, &e.optionTokenId, e.size);
                Ok(())
            },
            LedgerEvent::Transfer(e) => self.transfer(meta, e),
            LedgerEvent::FeedSettlePrice(e) => self.feed_settle_price(meta, e),
            LedgerEvent::CollectFees(e) => {
                self.collect_fees(meta, None, &e.token, e.feeUsd, e.feeAmount, None);
                Ok(())
            },
            LedgerEvent::CollectPositionFees(e) => {
                self.collect_fees(
                    meta,
                    Some(&e.account),
                    &e.token,
                    e.feeUsd,
                    e.feeAmount,
                    Some(e.isSettle),
                );
                Ok(())
            },
            LedgerEvent::BuyUsdg(e) => {
                self.buy_usdg(meta, e);
                Ok(())
            },
            LedgerEvent::SellUsdg(e) => {
                self.sell_usdg(meta, e);
                Ok(())
            },
            LedgerEvent::AddLiquidity(e) => {
                self.add_liquidity(meta, e);
                Ok(())
            },
            LedgerEvent::RemoveLiquidity(e) => {
                self.remove_liquidity(meta, e);
                Ok(())
            },
            LedgerEvent::NotifyPendingAmount(e) => {
                self.notify_pending_amount(meta, e);
                Ok(())
            },
            LedgerEvent::EnqueuedMintAndStake(e) => {
                self.enqueue_mint(meta, e);
                Ok(())
            },
            LedgerEvent::EnqueuedUnstakeAndRedeem(e) => {
                self.enqueue_redeem(meta, e);
                Ok(())
            },
            LedgerEvent::ProcessedQueueAction(e) => {
                self.process_queue_item(meta, e);
                Ok(())
            },
            LedgerEvent::CancelledQueueAction(e) => {
                self.cancel_queue_item(meta, e);
                Ok(())
            },
        }
    }

    fn touch_position(&mut self, id: &str) {
        if !self.touched_positions.iter().any(|t| t == id) {
            self.touched_positions.push(id.to_string());
        }
    }

    /// Queue a counter increment keyed by `{txHash}-{logIndex}-{seq}`, where
    /// `seq` counts the intents already queued for the same log.
    fn queue_counter(&mut self, meta: &LogMeta, counter_key: String, delta: &BigDecimal) {
        let pointer = meta.pointer();
        let seq = match self.counter_seq {
            Some((last, seq)) if last == pointer => seq + 1,
            _ => 0,
        };
        self.counter_seq = Some((pointer, seq));

        self.counters.push(CounterIntent {
            idempotency_key: format!("{}-{}", meta.log_id(), seq),
            counter_key,
            delta: delta.clone(),
        });
    }

    fn touch_queue_item(&mut self, id: &str) {
        if !self.touched_queue_items.iter().any(|t| t == id) {
            self.touched_queue_items.push(id.to_string());
        }
    }

    /// Everything the range changed, in first-touch order.
    pub fn into_changes(mut self) -> RangeChanges {
        let positions = self
            .touched_positions
            .iter()
            .filter_map(|id| self.positions.remove(id))
            .collect();
        let queue_items = self
            .touched_queue_items
            .iter()
            .filter_map(|id| self.queue_items.remove(id))
            .collect();

        RangeChanges {
            positions,
            history: self.history,
            daily: self.daily.into_values().collect(),
            watermark: self.watermark,
            counters: self.counters,
            settle_prices: self.settle_prices,
            fees: self.fees,
            queue_items,
            usdg_swaps: self.usdg_swaps,
            liquidity_changes: self.liquidity_changes,
            pending_amounts: self.pending_amounts,
            dead_letters: Vec::new(),
        }
    }
}
