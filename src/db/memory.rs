//! In-memory [`LedgerStore`] used by scanner tests.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::db::{
    models::{
        CollectedFee, CounterIntent, DailyAggregate, DeadLetter, LiquidityChange,
        LiquidityQueueItem, PendingAmount, Position, PositionHistory, RequestIndexWatermark,
        SettlePrice, SyncState, UsdgSwap,
    },
    LedgerStore, RangeChanges,
};

/// Committed contents, keyed the way the relational tables are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub cursor: Option<u64>,
    pub positions: BTreeMap<String, Position>,
    pub history: BTreeMap<(String, u64, u64), PositionHistory>,
    pub daily: BTreeMap<String, DailyAggregate>,
    pub watermark: Option<RequestIndexWatermark>,
    pub counters: BTreeMap<String, CounterIntent>,
    pub settle_prices: BTreeMap<String, SettlePrice>,
    pub fees: BTreeMap<String, CollectedFee>,
    pub queue_items: BTreeMap<String, LiquidityQueueItem>,
    pub usdg_swaps: BTreeMap<String, UsdgSwap>,
    pub liquidity_changes: BTreeMap<String, LiquidityChange>,
    pub pending_amounts: BTreeMap<String, PendingAmount>,
    pub dead_letters: Vec<DeadLetter>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing_loads: AtomicUsize,
    failing_commits: AtomicUsize,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` cursor loads.
    pub fn fail_loads(&self, n: usize) {
        self.failing_loads.store(n, Ordering::SeqCst);
    }

    /// Reject the next `n` commits.
    pub fn fail_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Successful commits so far.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }

    pub fn cursor(&self) -> Option<u64> {
        self.state.lock().unwrap().cursor
    }
}

/// Consume one scheduled failure, if any is left.
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load_sync_state(&self) -> anyhow::Result<Option<SyncState>> {
        if take_failure(&self.failing_loads) {
            anyhow::bail!("connection reset");
        }
        Ok(self.cursor().map(SyncState::new))
    }

    async fn load_positions(&self, ids: &[String]) -> anyhow::Result<Vec<Position>> {
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.positions.get(id).cloned())
            .collect())
    }

    async fn load_queue_items(&self, ids: &[String]) -> anyhow::Result<Vec<LiquidityQueueItem>> {
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.queue_items.get(id).cloned())
            .collect())
    }

    async fn commit_range(&self, changes: &RangeChanges, state: &SyncState) -> anyhow::Result<()> {
        if take_failure(&self.failing_commits) {
            anyhow::bail!("connection closed");
        }

        // Work on a copy so a rejected commit leaves nothing behind.
        let mut next = self.state.lock().unwrap().clone();

        for position in &changes.positions {
            next.positions.insert(position.id.clone(), position.clone());
        }
        for row in &changes.history {
            if !next.positions.contains_key(&row.position_id) {
                anyhow::bail!("history row references missing position {}", row.position_id);
            }
            next.history
                .entry((row.position_id.clone(), row.block_number, row.log_index))
                .or_insert_with(|| row.clone());
        }
        for delta in &changes.daily {
            let total = next
                .daily
                .entry(delta.id.clone())
                .or_insert_with(|| DailyAggregate::new(delta.id.clone(), delta.underlying_asset_index));
            total.accumulated_notional_volume += &delta.accumulated_notional_volume;
            total.accumulated_execution_price += &delta.accumulated_execution_price;
        }
        if let Some(watermark) = &changes.watermark {
            next.watermark = Some(watermark.clone());
        }
        for counter in &changes.counters {
            next.counters
                .entry(counter.idempotency_key.clone())
                .or_insert_with(|| counter.clone());
        }
        for price in &changes.settle_prices {
            next.settle_prices
                .entry(price.id.clone())
                .or_insert_with(|| price.clone());
        }
        for fee in &changes.fees {
            next.fees.entry(fee.id.clone()).or_insert_with(|| fee.clone());
        }
        for item in &changes.queue_items {
            next.queue_items.insert(item.id.clone(), item.clone());
        }
        for swap in &changes.usdg_swaps {
            next.usdg_swaps
                .entry(swap.id.clone())
                .or_insert_with(|| swap.clone());
        }
        for change in &changes.liquidity_changes {
            next.liquidity_changes
                .entry(change.id.clone())
                .or_insert_with(|| change.clone());
        }
        for pending in &changes.pending_amounts {
            next.pending_amounts
                .entry(pending.id.clone())
                .or_insert_with(|| pending.clone());
        }
        for letter in &changes.dead_letters {
            let seen = next.dead_letters.iter().any(|d| {
                d.block_number == letter.block_number
                    && d.transaction_hash == letter.transaction_hash
                    && d.log_index == letter.log_index
            });
            if !seen {
                next.dead_letters.push(letter.clone());
            }
        }
        next.cursor = Some(state.block_number);

        *self.state.lock().unwrap() = next;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
