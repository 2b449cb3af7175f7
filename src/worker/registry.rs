//! Static subscription table: which event kinds are read from which contract.

use alloy::{
    primitives::{Address, B256},
    sol_types::SolEvent,
};
use anyhow::Context;
use rustc_hash::FxHashMap;

use crate::{
    abis::{
        controller, olp_manager, olp_queue, options_token, position_manager, settle_price_feed,
        vault, vault_utils,
    },
    config::ContractSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OpenBuyPosition,
    OpenSellPosition,
    CloseBuyPosition,
    CloseSellPosition,
    SettleBuyPosition,
    SettleSellPosition,
    ClearPosition,
    CreateClosePosition,
    CancelClosePosition,
    TransferSingle,
    FeedSettlePrice,
    CollectFees,
    CollectPositionFees,
    BuyUsdg,
    SellUsdg,
    AddLiquidity,
    RemoveLiquidity,
    NotifyPendingAmount,
    EnqueuedMintAndStake,
    EnqueuedUnstakeAndRedeem,
    ProcessedQueueAction,
    CancelledQueueAction,
}

impl EventKind {
    pub fn topic(&self) -> B256 {
        match self {
            Self::OpenBuyPosition => controller::OpenBuyPosition::SIGNATURE_HASH,
            Self::OpenSellPosition => controller::OpenSellPosition::SIGNATURE_HASH,
            Self::CloseBuyPosition => controller::CloseBuyPosition::SIGNATURE_HASH,
            Self::CloseSellPosition => controller::CloseSellPosition::SIGNATURE_HASH,
            Self::SettleBuyPosition => controller::SettleBuyPosition::SIGNATURE_HASH,
            Self::SettleSellPosition => controller::SettleSellPosition::SIGNATURE_HASH,
            Self::ClearPosition => controller::ClearPosition::SIGNATURE_HASH,
            Self::CreateClosePosition => position_manager::CreateClosePosition::SIGNATURE_HASH,
            Self::CancelClosePosition => position_manager::CancelClosePosition::SIGNATURE_HASH,
            Self::TransferSingle => options_token::TransferSingle::SIGNATURE_HASH,
            Self::FeedSettlePrice => settle_price_feed::FeedSettlePrice::SIGNATURE_HASH,
            Self::CollectFees => vault::CollectFees::SIGNATURE_HASH,
            Self::CollectPositionFees => vault::CollectPositionFees::SIGNATURE_HASH,
            Self::BuyUsdg => vault::BuyUSDG::SIGNATURE_HASH,
            Self::SellUsdg => vault::SellUSDG::SIGNATURE_HASH,
            Self::AddLiquidity => olp_manager::AddLiquidity::SIGNATURE_HASH,
            Self::RemoveLiquidity => olp_manager::RemoveLiquidity::SIGNATURE_HASH,
            Self::NotifyPendingAmount => vault_utils::NotifyPendingAmount::SIGNATURE_HASH,
            Self::EnqueuedMintAndStake => olp_queue::EnqueuedMintAndStake::SIGNATURE_HASH,
            Self::EnqueuedUnstakeAndRedeem => olp_queue::EnqueuedUnstakeAndRedeem::SIGNATURE_HASH,
            Self::ProcessedQueueAction => olp_queue::ProcessedQueueAction::SIGNATURE_HASH,
            Self::CancelledQueueAction => olp_queue::CancelledQueueAction::SIGNATURE_HASH,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenBuyPosition => "OpenBuyPosition",
            Self::OpenSellPosition => "OpenSellPosition",
            Self::CloseBuyPosition => "CloseBuyPosition",
            Self::CloseSellPosition => "CloseSellPosition",
            Self::SettleBuyPosition => "SettleBuyPosition",
            Self::SettleSellPosition => "SettleSellPosition",
            Self::ClearPosition => "ClearPosition",
            Self::CreateClosePosition => "CreateClosePosition",
            Self::CancelClosePosition => "CancelClosePosition",
            Self::TransferSingle => "TransferSingle",
            Self::FeedSettlePrice => "FeedSettlePrice",
            Self::CollectFees => "CollectFees",
            Self::CollectPositionFees => "CollectPositionFees",
            Self::BuyUsdg => "BuyUSDG",
            Self::SellUsdg => "SellUSDG",
            Self::AddLiquidity => "AddLiquidity",
            Self::RemoveLiquidity => "RemoveLiquidity",
            Self::NotifyPendingAmount => "NotifyPendingAmount",
            Self::EnqueuedMintAndStake => "EnqueuedMintAndStake",
            Self::EnqueuedUnstakeAndRedeem => "EnqueuedUnstakeAndRedeem",
            Self::ProcessedQueueAction => "ProcessedQueueAction",
            Self::CancelledQueueAction => "CancelledQueueAction",
        }
    }
}

const CONTROLLER_EVENTS: &[EventKind] = &[
    EventKind::OpenBuyPosition,
    EventKind::OpenSellPosition,
    EventKind::CloseBuyPosition,
    EventKind::CloseSellPosition,
    EventKind::SettleBuyPosition,
    EventKind::SettleSellPosition,
    EventKind::ClearPosition,
];

const POSITION_MANAGER_EVENTS: &[EventKind] =
    &[EventKind::CreateClosePosition, EventKind::CancelClosePosition];

const VAULT_EVENTS: &[EventKind] = &[
    EventKind::CollectFees,
    EventKind::CollectPositionFees,
    EventKind::BuyUsdg,
    EventKind::SellUsdg,
];

const OLP_MANAGER_EVENTS: &[EventKind] = &[EventKind::AddLiquidity, EventKind::RemoveLiquidity];

const OLP_QUEUE_EVENTS: &[EventKind] = &[
    EventKind::EnqueuedMintAndStake,
    EventKind::EnqueuedUnstakeAndRedeem,
    EventKind::ProcessedQueueAction,
    EventKind::CancelledQueueAction,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub address: Address,
    pub kind: EventKind,
}

/// All subscriptions of one contract, fetched with a single log query.
#[derive(Debug, Clone)]
pub struct AddressGroup {
    pub address: Address,
    kinds: Vec<EventKind>,
    by_topic: FxHashMap<B256, EventKind>,
}

impl AddressGroup {
    fn new(address: Address) -> Self {
        Self {
            address,
            kinds: Vec::new(),
            by_topic: FxHashMap::default(),
        }
    }

    fn push(&mut self, kind: EventKind) {
        if self.by_topic.insert(kind.topic(), kind).is_none() {
            self.kinds.push(kind);
        }
    }

    /// Topic0 values OR-ed together in the log query.
    pub fn topics(&self) -> Vec<B256> {
        self.kinds.iter().map(|k| k.topic()).collect()
    }

    pub fn kind_for(&self, topic0: &B256) -> Option<EventKind> {
        self.by_topic.get(topic0).copied()
    }
}

/// Subscriptions grouped by contract address, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    groups: Vec<AddressGroup>,
}

impl SubscriptionRegistry {
    pub fn new(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        let mut groups: Vec<AddressGroup> = Vec::new();
        let mut index: FxHashMap<Address, usize> = FxHashMap::default();

        for sub in subscriptions {
            let slot = *index.entry(sub.address).or_insert_with(|| {
                groups.push(AddressGroup::new(sub.address));
                groups.len() - 1
            });
            groups[slot].push(sub.kind);
        }

        Self { groups }
    }

    pub fn from_contracts(contracts: &ContractSettings) -> anyhow::Result<Self> {
        let mut subscriptions = Vec::new();
        let mut add = |address: &str, kinds: &[EventKind]| -> anyhow::Result<()> {
            let address: Address = address
                .parse()
                .with_context(|| format!("Invalid contract address {}", address))?;
            subscriptions.extend(kinds.iter().map(|&kind| Subscription { address, kind }));
            Ok(())
        };

        add(&contracts.controller, CONTROLLER_EVENTS)?;
        add(&contracts.position_manager, POSITION_MANAGER_EVENTS)?;
        add(&contracts.settle_price_feed, &[EventKind::FeedSettlePrice])?;
        for token in &contracts.options_tokens {
            add(token, &[EventKind::TransferSingle])?;
        }
        for vault in &contracts.vaults {
            add(&vault.address, VAULT_EVENTS)?;
            if let Some(olp) = &vault.olp {
                add(&olp.manager, OLP_MANAGER_EVENTS)?;
                add(&olp.vault_utils, &[EventKind::NotifyPendingAmount])?;
            }
        }
        for queue in &contracts.olp_queues {
            add(queue, OLP_QUEUE_EVENTS)?;
        }

        Ok(Self::new(subscriptions))
    }

    pub fn groups(&self) -> &[AddressGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.kinds.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
