//! Log decoding: raw logs into typed ledger events.

use std::fmt;

use alloy::{
    primitives::{Address, LogData, B256},
    sol_types::SolEvent,
};

use crate::{
    abis::{
        controller, olp_manager, olp_queue, options_token, position_manager, settle_price_feed,
        vault, vault_utils,
    },
    error::IngestError,
    utils::hex_encode,
    worker::{registry::EventKind, source::RawLog},
};

/// Identity of a log on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogPointer {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl fmt::Display for LogPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} tx {} log {}",
            self.block_number, self.transaction_hash, self.log_index
        )
    }
}

/// Positional metadata shared by every decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub kind: EventKind,
    pub address: Address,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl LogMeta {
    /// Total order of logs on chain.
    pub fn ordering_key(&self) -> (u64, u64, u64) {
        (self.block_number, self.transaction_index, self.log_index)
    }

    pub fn pointer(&self) -> LogPointer {
        LogPointer {
            block_number: self.block_number,
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
        }
    }

    pub fn tx_hash(&self) -> String {
        hex_encode(self.transaction_hash.as_slice())
    }

    /// Id shared by all rows derived from this single log.
    pub fn log_id(&self) -> String {
        format!("{}-{}", self.tx_hash(), self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    OpenBuy(controller::OpenBuyPosition),
    OpenSell(controller::OpenSellPosition),
    CloseBuy(controller::CloseBuyPosition),
    CloseSell(controller::CloseSellPosition),
    SettleBuy(controller::SettleBuyPosition),
    SettleSell(controller::SettleSellPosition),
    Clear(controller::ClearPosition),
    CreateClose(position_manager::CreateClosePosition),
    CancelClose(position_manager::CancelClosePosition),
    Transfer(options_token::TransferSingle),
    FeedSettlePrice(settle_price_feed::FeedSettlePrice),
    CollectFees(vault::CollectFees),
    CollectPositionFees(vault::CollectPositionFees),
    BuyUsdg(vault::BuyUSDG),
    SellUsdg(vault::SellUSDG),
    AddLiquidity(olp_manager::AddLiquidity),
    RemoveLiquidity(olp_manager::RemoveLiquidity),
    NotifyPendingAmount(vault_utils::NotifyPendingAmount),
    EnqueuedMintAndStake(olp_queue::EnqueuedMintAndStake),
    EnqueuedUnstakeAndRedeem(olp_queue::EnqueuedUnstakeAndRedeem),
    ProcessedQueueAction(olp_queue::ProcessedQueueAction),
    CancelledQueueAction(olp_queue::CancelledQueueAction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub meta: LogMeta,
    pub event: LedgerEvent,
}

fn decode_as<E: SolEvent>(kind: EventKind, data: &LogData, raw: &RawLog) -> Result<E, IngestError> {
    E::decode_log_data(data).map_err(|e| IngestError::Decode {
        log: raw.pointer(),
        address: raw.address,
        topic0: kind.topic(),
        event: kind.name(),
        reason: e.to_string(),
    })
}

/// Decode `raw` as `kind`, stamping it with its block timestamp.
pub fn decode_log(
    kind: EventKind,
    raw: &RawLog,
    block_timestamp: u64,
) -> Result<DecodedLog, IngestError> {
    let data = LogData::new_unchecked(raw.topics.clone(), raw.data.clone());

    let event = match kind {
        EventKind::OpenBuyPosition => LedgerEvent::OpenBuy(decode_as(kind, &data, raw)?),
        EventKind::OpenSellPosition => LedgerEvent::OpenSell(decode_as(kind, &data, raw)?),
        EventKind::CloseBuyPosition => LedgerEvent::CloseBuy(decode_as(kind, &data, raw)?),
        EventKind::CloseSellPosition => LedgerEvent::CloseSell(decode_as(kind, &data, raw)?),
        EventKind::SettleBuyPosition => LedgerEvent::SettleBuy(decode_as(kind, &data, raw)?),
        EventKind::SettleSellPosition => LedgerEvent::SettleSell(decode_as(kind, &data, raw)?),
        EventKind::ClearPosition => LedgerEvent::Clear(decode_as(kind, &data, raw)?),
        EventKind::CreateClosePosition => LedgerEvent::CreateClose(decode_as(kind, &data, raw)?),
        EventKind::CancelClosePosition => LedgerEvent::CancelClose(decode_as(kind, &data, raw)?),
        EventKind::TransferSingle => LedgerEvent::Transfer(decode_as(kind, &data, raw)?),
        EventKind::FeedSettlePrice => LedgerEvent::FeedSettlePrice(decode_as(kind, &data, raw)?),
        EventKind::CollectFees => LedgerEvent::CollectFees(decode_as(kind, &data, raw)?),
        EventKind::CollectPositionFees => {
            LedgerEvent::CollectPositionFees(decode_as(kind, &data, raw)?)
        },
        EventKind::BuyUsdg => LedgerEvent::BuyUsdg(decode_as(kind, &data, raw)?),
        EventKind::SellUsdg => LedgerEvent::SellUsdg(decode_as(kind, &data, raw)?),
        EventKind::AddLiquidity => LedgerEvent::AddLiquidity(decode_as(kind, &data, raw)?),
        EventKind::RemoveLiquidity => LedgerEvent::RemoveLiquidity(decode_as(kind, &data, raw)?),
        EventKind::NotifyPendingAmount => {
            LedgerEvent::NotifyPendingAmount(decode_as(kind, &data, raw)?)
        },
        EventKind::EnqueuedMintAndStake => {
            LedgerEvent::EnqueuedMintAndStake(decode_as(kind, &data, raw)?)
        },
        EventKind::EnqueuedUnstakeAndRedeem => {
            LedgerEvent::EnqueuedUnstakeAndRedeem(decode_as(kind, &data, raw)?)
        },
        EventKind::ProcessedQueueAction => {
            LedgerEvent::ProcessedQueueAction(decode_as(kind, &data, raw)?)
        },
        EventKind::CancelledQueueAction => {
            LedgerEvent::CancelledQueueAction(decode_as(kind, &data, raw)?)
        },
    };

    Ok(DecodedLog {
        meta: LogMeta {
            kind,
            address: raw.address,
            block_number: raw.block_number,
            block_timestamp,
            transaction_hash: raw.transaction_hash,
            transaction_index: raw.transaction_index,
            log_index: raw.log_index,
        },
        event,
    })
}
