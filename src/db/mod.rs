use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;

#[cfg(test)]
pub mod memory;
pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

use models::{
    CollectedFee, CounterIntent, DailyAggregate, DeadLetter, LiquidityChange, LiquidityQueueItem,
    PendingAmount, Position, PositionHistory, RequestIndexWatermark, SettlePrice, SyncState,
    UsdgSwap,
};

/// Everything one block range changed, committed together with the cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeChanges {
    /// Full rows of every position the range touched
    pub positions: Vec<Position>,
    pub history: Vec<PositionHistory>,
    /// Per-day deltas, added onto the persisted totals
    pub daily: Vec<DailyAggregate>,
    pub watermark: Option<RequestIndexWatermark>,
    pub counters: Vec<CounterIntent>,
    pub settle_prices: Vec<SettlePrice>,
    pub fees: Vec<CollectedFee>,
    pub queue_items: Vec<LiquidityQueueItem>,
    pub usdg_swaps: Vec<UsdgSwap>,
    pub liquidity_changes: Vec<LiquidityChange>,
    pub pending_amounts: Vec<PendingAmount>,
    pub dead_letters: Vec<DeadLetter>,
}

impl RangeChanges {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
            && self.history.is_empty()
            && self.daily.is_empty()
            && self.watermark.is_none()
            && self.counters.is_empty()
            && self.settle_prices.is_empty()
            && self.fees.is_empty()
            && self.queue_items.is_empty()
            && self.usdg_swaps.is_empty()
            && self.liquidity_changes.is_empty()
            && self.pending_amounts.is_empty()
            && self.dead_letters.is_empty()
    }
}

/// Persistence seam of the scanner.
///
/// `commit_range` must be all-or-nothing: either every change and the new
/// cursor are stored, or none of them.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load_sync_state(&self) -> anyhow::Result<Option<SyncState>>;

    async fn load_positions(&self, ids: &[String]) -> anyhow::Result<Vec<Position>>;

    async fn load_queue_items(&self, ids: &[String]) -> anyhow::Result<Vec<LiquidityQueueItem>>;

    async fn commit_range(&self, changes: &RangeChanges, state: &SyncState) -> anyhow::Result<()>;
}

/// Database handle shared by the scanner and the outbox drainer.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: Arc<Settings>) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;

        postgres.migrate().await?;

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
