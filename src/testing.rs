//! Fixtures shared by unit tests: a scripted chain and event builders.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Mutex,
};

use alloy::{
    primitives::{address, Address, Bytes, B256, U256},
    sol_types::SolEvent,
};
use async_trait::async_trait;

use crate::{
    abis::{controller, options_token, position_manager},
    config::{
        AssetSettings, ChainSettings, ContractSettings, OlpSettings, OutboxSettings,
        PostgresSettings, Settings, TokenSettings, VaultSettings,
    },
    error::IngestError,
    ledger::LedgerContext,
    utils::{encode_option_id, Leg},
    worker::{
        parser::{DecodedLog, LedgerEvent, LogMeta},
        registry::EventKind,
        source::{ChainSource, RawLog},
    },
};

pub const CONTROLLER: Address = address!("0x1000000000000000000000000000000000000001");
pub const POSITION_MANAGER: Address = address!("0x1000000000000000000000000000000000000002");
pub const SETTLE_MANAGER: Address = address!("0x1000000000000000000000000000000000000003");
pub const SETTLE_PRICE_FEED: Address = address!("0x1000000000000000000000000000000000000004");
pub const OPTIONS_TOKEN: Address = address!("0x1000000000000000000000000000000000000005");
pub const OLP_QUEUE: Address = address!("0x1000000000000000000000000000000000000006");
pub const VAULT_S: Address = address!("0x1000000000000000000000000000000000000007");
pub const VAULT_M: Address = address!("0x1000000000000000000000000000000000000008");
pub const OLP_S: Address = address!("0x1000000000000000000000000000000000000009");
pub const OLP_MANAGER_S: Address = address!("0x100000000000000000000000000000000000000a");
pub const VAULT_UTILS_S: Address = address!("0x100000000000000000000000000000000000000b");

pub const WBTC: Address = address!("0x2000000000000000000000000000000000000001");
pub const WETH: Address = address!("0x2000000000000000000000000000000000000002");
pub const USDC: Address = address!("0x2000000000000000000000000000000000000003");

pub const ALICE: Address = address!("0x3000000000000000000000000000000000000001");
pub const BOB: Address = address!("0x3000000000000000000000000000000000000002");

pub const BTC_INDEX: u16 = 1;
pub const ETH_INDEX: u16 = 2;
/// 2024-03-08 08:00 UTC
pub const EXPIRY: u64 = 1_709_884_800;
/// 2024-03-01 00:00 UTC
const GENESIS_TIME: u64 = 1_709_251_200;

/// Deterministic block time used by [`MockChain`] and [`decoded`].
pub fn timestamp_of(block: u64) -> u64 {
    GENESIS_TIME + block * 2
}

pub fn settings() -> Settings {
    let addr = |a: Address| a.to_string();
    Settings {
        postgres: PostgresSettings {
            host: "localhost".to_string(),
            port: 5432,
            user: "ledger".to_string(),
            password: "ledger".to_string(),
            database: "ledger".to_string(),
            pool_size: 1,
        },
        chain: ChainSettings {
            rpc_url: "http://localhost:8545".to_string(),
            start_block: 0,
            batch_size: 100,
            poll_interval_ms: 10,
            max_range_attempts: 3,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 40,
        },
        contracts: ContractSettings {
            controller: addr(CONTROLLER),
            position_manager: addr(POSITION_MANAGER),
            settle_manager: addr(SETTLE_MANAGER),
            settle_price_feed: addr(SETTLE_PRICE_FEED),
            vaults: vec![
                VaultSettings {
                    name: "sVault".to_string(),
                    address: addr(VAULT_S),
                    olp: Some(OlpSettings {
                        name: "sOlp".to_string(),
                        address: addr(OLP_S),
                        manager: addr(OLP_MANAGER_S),
                        vault_utils: addr(VAULT_UTILS_S),
                    }),
                },
                VaultSettings {
                    name: "mVault".to_string(),
                    address: addr(VAULT_M),
                    olp: None,
                },
            ],
            options_tokens: vec![addr(OPTIONS_TOKEN)],
            olp_queues: vec![addr(OLP_QUEUE)],
        },
        assets: vec![
            AssetSettings {
                index: BTC_INDEX,
                ticker: "BTC".to_string(),
                address: addr(WBTC),
                decimals: 8,
            },
            AssetSettings {
                index: ETH_INDEX,
                ticker: "ETH".to_string(),
                address: addr(WETH),
                decimals: 18,
            },
        ],
        tokens: vec![TokenSettings {
            address: addr(USDC),
            ticker: "USDC".to_string(),
            decimals: 6,
        }],
        outbox: OutboxSettings::default(),
        redpanda: None,
    }
}

pub fn ledger_context() -> LedgerContext {
    LedgerContext::from_settings(&settings()).unwrap()
}

/// `value * 1e30`, the on-chain price scale.
pub fn price(value: u64) -> U256 {
    U256::from(value) * U256::from(10u64).pow(U256::from(30u64))
}

pub fn btc_option(legs: &[Leg], vault_index: u8) -> U256 {
    encode_option_id(BTC_INDEX, EXPIRY, legs.len() as u8, legs, vault_index).unwrap()
}

pub fn btc_call(strike: u64) -> U256 {
    btc_option(&[Leg::new(true, strike, true)], 0)
}

pub fn btc_sold_call(strike: u64) -> U256 {
    btc_option(&[Leg::new(false, strike, true)], 0)
}

/// An id whose strategy bits are zero.
pub fn malformed_option() -> U256 {
    U256::from(BTC_INDEX) << 240usize
}

// ==================== EVENT BUILDERS ====================

pub fn open_buy(
    account: Address,
    option: U256,
    size: u64,
    execution: U256,
    spot: U256,
    request_index: u64,
) -> LedgerEvent {
    LedgerEvent::OpenBuy(controller::OpenBuyPosition {
        account,
        requestIndex: U256::from(request_index),
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        quoteToken: USDC,
        amountPaid: U256::from(size) * U256::from(3u64),
        executionPrice: execution,
        spotPrice: spot,
    })
}

pub fn open_sell(
    account: Address,
    option: U256,
    size: u64,
    execution: U256,
    spot: U256,
    request_index: u64,
) -> LedgerEvent {
    LedgerEvent::OpenSell(controller::OpenSellPosition {
        account,
        requestIndex: U256::from(request_index),
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        quoteToken: USDC,
        amountReceived: U256::from(size) * U256::from(3u64),
        collateralToken: WBTC,
        collateralAmount: U256::from(size),
        executionPrice: execution,
        spotPrice: spot,
    })
}

pub fn close_buy(
    account: Address,
    option: U256,
    size: u64,
    execution: U256,
    request_index: u64,
) -> LedgerEvent {
    LedgerEvent::CloseBuy(controller::CloseBuyPosition {
        account,
        requestIndex: U256::from(request_index),
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        quoteToken: USDC,
        amountReceived: U256::from(size) * U256::from(2u64),
        executionPrice: execution,
        spotPrice: price(61_000),
    })
}

pub fn close_sell(
    account: Address,
    option: U256,
    size: u64,
    execution: U256,
    request_index: u64,
) -> LedgerEvent {
    LedgerEvent::CloseSell(controller::CloseSellPosition {
        account,
        requestIndex: U256::from(request_index),
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        quoteToken: USDC,
        amountPaid: U256::from(size) * U256::from(2u64),
        collateralToken: WBTC,
        collateralAmount: U256::from(size),
        executionPrice: execution,
        spotPrice: price(61_000),
    })
}

pub fn settle_sell(account: Address, option: U256, size: u64, settle_price: U256) -> LedgerEvent {
    LedgerEvent::SettleSell(controller::SettleSellPosition {
        account,
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        quoteToken: USDC,
        amountPaid: U256::ZERO,
        collateralToken: WBTC,
        collateralAmount: U256::from(size),
        settlePrice: settle_price,
    })
}

pub fn settle_buy(account: Address, option: U256, size: u64, settle_price: U256) -> LedgerEvent {
    LedgerEvent::SettleBuy(controller::SettleBuyPosition {
        account,
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        quoteToken: USDC,
        amountReceived: U256::from(size),
        settlePrice: settle_price,
    })
}

pub fn create_close(account: Address, option: U256, size: u64) -> LedgerEvent {
    LedgerEvent::CreateClose(position_manager::CreateClosePosition {
        account,
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        path: vec![USDC],
        minAmountOut: U256::ZERO,
        minOutWhenSwap: U256::ZERO,
        executionFee: U256::ZERO,
        index: U256::from(1u64),
        blockTime: alloy::primitives::aliases::U40::from(0u64),
    })
}

pub fn cancel_close(account: Address, option: U256, size: u64) -> LedgerEvent {
    LedgerEvent::CancelClose(position_manager::CancelClosePosition {
        account,
        underlyingAssetIndex: BTC_INDEX,
        expiry: alloy::primitives::aliases::U40::from(EXPIRY),
        optionTokenId: option,
        size: U256::from(size),
        path: vec![USDC],
        timeGap: alloy::primitives::aliases::U40::from(0u64),
    })
}

pub fn transfer(from: Address, to: Address, option: U256, size: u64) -> LedgerEvent {
    LedgerEvent::Transfer(options_token::TransferSingle {
        operator: from,
        from,
        to,
        id: option,
        value: U256::from(size),
    })
}

pub fn clear(vault: Address, option: U256, opposite: U256, size: u64) -> LedgerEvent {
    LedgerEvent::Clear(controller::ClearPosition {
        vault,
        counterparty: Address::ZERO,
        optionTokenId: option,
        oppositeOptionTokenId: opposite,
        sizeToClear: U256::from(size),
    })
}

/// Kind and emitting contract of a ledger event.
pub fn origin(event: &LedgerEvent) -> (EventKind, Address) {
    match event {
        LedgerEvent::OpenBuy(_) => (EventKind::OpenBuyPosition, CONTROLLER),
        LedgerEvent::OpenSell(_) => (EventKind::OpenSellPosition, CONTROLLER),
        LedgerEvent::CloseBuy(_) => (EventKind::CloseBuyPosition, CONTROLLER),
        LedgerEvent::CloseSell(_) => (EventKind::CloseSellPosition, CONTROLLER),
        LedgerEvent::SettleBuy(_) => (EventKind::SettleBuyPosition, CONTROLLER),
        LedgerEvent::SettleSell(_) => (EventKind::SettleSellPosition, CONTROLLER),
        LedgerEvent::Clear(_) => (EventKind::ClearPosition, CONTROLLER),
        LedgerEvent::CreateClose(_) => (EventKind::CreateClosePosition, POSITION_MANAGER),
        LedgerEvent::CancelClose(_) => (EventKind::CancelClosePosition, POSITION_MANAGER),
        LedgerEvent::Transfer(_) => (EventKind::TransferSingle, OPTIONS_TOKEN),
        LedgerEvent::FeedSettlePrice(_) => (EventKind::FeedSettlePrice, SETTLE_PRICE_FEED),
        LedgerEvent::CollectFees(_) => (EventKind::CollectFees, VAULT_S),
        LedgerEvent::CollectPositionFees(_) => (EventKind::CollectPositionFees, VAULT_S),
        LedgerEvent::BuyUsdg(_) => (EventKind::BuyUsdg, VAULT_S),
        LedgerEvent::SellUsdg(_) => (EventKind::SellUsdg, VAULT_S),
        LedgerEvent::AddLiquidity(_) => (EventKind::AddLiquidity, OLP_MANAGER_S),
        LedgerEvent::RemoveLiquidity(_) => (EventKind::RemoveLiquidity, OLP_MANAGER_S),
        LedgerEvent::NotifyPendingAmount(_) => (EventKind::NotifyPendingAmount, VAULT_UTILS_S),
        LedgerEvent::EnqueuedMintAndStake(_) => (EventKind::EnqueuedMintAndStake, OLP_QUEUE),
        LedgerEvent::EnqueuedUnstakeAndRedeem(_) => {
            (EventKind::EnqueuedUnstakeAndRedeem, OLP_QUEUE)
        },
        LedgerEvent::ProcessedQueueAction(_) => (EventKind::ProcessedQueueAction, OLP_QUEUE),
        LedgerEvent::CancelledQueueAction(_) => (EventKind::CancelledQueueAction, OLP_QUEUE),
    }
}

pub fn tx_hash(block: u64, tx_index: u64) -> B256 {
    B256::left_padding_from(&((block << 16) | tx_index).to_be_bytes())
}

/// Decoded log at `(block, 0, log_index)` emitted by the event's usual contract.
pub fn decoded(event: LedgerEvent, block: u64, log_index: u64) -> DecodedLog {
    let (kind, address) = origin(&event);
    DecodedLog {
        meta: LogMeta {
            kind,
            address,
            block_number: block,
            block_timestamp: timestamp_of(block),
            transaction_hash: tx_hash(block, 0),
            transaction_index: 0,
            log_index,
        },
        event,
    }
}

/// Encode a decoded fixture back into the raw log a node would return.
pub fn raw_of(log: &DecodedLog) -> RawLog {
    let data = match &log.event {
        LedgerEvent::OpenBuy(e) => e.encode_log_data(),
        LedgerEvent::OpenSell(e) => e.encode_log_data(),
        LedgerEvent::CloseBuy(e) => e.encode_log_data(),
        LedgerEvent::CloseSell(e) => e.encode_log_data(),
        LedgerEvent::SettleBuy(e) => e.encode_log_data(),
        LedgerEvent::SettleSell(e) => e.encode_log_data(),
        LedgerEvent::Clear(e) => e.encode_log_data(),
        LedgerEvent::CreateClose(e) => e.encode_log_data(),
        LedgerEvent::CancelClose(e) => e.encode_log_data(),
        LedgerEvent::Transfer(e) => e.encode_log_data(),
        LedgerEvent::FeedSettlePrice(e) => e.encode_log_data(),
        LedgerEvent::CollectFees(e) => e.encode_log_data(),
        LedgerEvent::CollectPositionFees(e) => e.encode_log_data(),
        LedgerEvent::BuyUsdg(e) => e.encode_log_data(),
        LedgerEvent::SellUsdg(e) => e.encode_log_data(),
        LedgerEvent::AddLiquidity(e) => e.encode_log_data(),
        LedgerEvent::RemoveLiquidity(e) => e.encode_log_data(),
        LedgerEvent::NotifyPendingAmount(e) => e.encode_log_data(),
        LedgerEvent::EnqueuedMintAndStake(e) => e.encode_log_data(),
        LedgerEvent::EnqueuedUnstakeAndRedeem(e) => e.encode_log_data(),
        LedgerEvent::ProcessedQueueAction(e) => e.encode_log_data(),
        LedgerEvent::CancelledQueueAction(e) => e.encode_log_data(),
    };
    RawLog {
        address: log.meta.address,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number: log.meta.block_number,
        transaction_hash: log.meta.transaction_hash,
        transaction_index: log.meta.transaction_index,
        log_index: log.meta.log_index,
    }
}

// ==================== MOCK CHAIN ====================

/// Scripted [`ChainSource`]. Returns every stored log of the queried address
/// in the block range, ignoring the topic filter.
pub struct MockChain {
    head: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
    timestamp_calls: AtomicUsize,
    log_calls: AtomicUsize,
    fail_logs: AtomicBool,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            logs: Mutex::new(Vec::new()),
            timestamp_calls: AtomicUsize::new(0),
            log_calls: AtomicUsize::new(0),
            fail_logs: AtomicBool::new(false),
        }
    }

    pub fn push<E: SolEvent>(
        &self,
        address: Address,
        block: u64,
        tx_index: u64,
        log_index: u64,
        event: &E,
    ) {
        let data = event.encode_log_data();
        self.push_raw(
            address,
            block,
            tx_index,
            log_index,
            data.topics().to_vec(),
            data.data.to_vec(),
        );
    }

    pub fn push_raw(
        &self,
        address: Address,
        block: u64,
        tx_index: u64,
        log_index: u64,
        topics: Vec<B256>,
        data: Vec<u8>,
    ) {
        self.push_log(RawLog {
            address,
            topics,
            data: Bytes::from(data),
            block_number: block,
            transaction_hash: tx_hash(block, tx_index),
            transaction_index: tx_index,
            log_index,
        });
    }

    pub fn push_log(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn fail_logs(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    pub fn timestamp_calls(&self) -> usize {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn head(&self) -> Result<u64, IngestError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: Address,
        _topics: &[B256],
    ) -> Result<Vec<RawLog>, IngestError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(IngestError::Rpc("eth_getLogs: connection reset".to_string()));
        }

        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.address == address
                    && log.block_number >= from_block
                    && log.block_number <= to_block
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, IngestError> {
        self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
        Ok(timestamp_of(block_number))
    }
}
