mod aggregates;
mod checkpoint;
mod collected_fee;
mod counter_intent;
mod dead_letter;
mod liquidity_queue;
mod position;
mod position_history;
mod settle_price;
mod vault_activity;

pub use aggregates::{DailyAggregate, RequestIndexWatermark};
pub use checkpoint::SyncState;
pub use collected_fee::{CollectedFee, FeeKind};
pub use counter_intent::{CounterIntent, PendingCounter};
pub use dead_letter::DeadLetter;
pub use liquidity_queue::{LiquidityQueueItem, QueueStatus};
pub use position::Position;
pub use position_history::{HistoryKind, PositionHistory};
pub use settle_price::SettlePrice;
pub use vault_activity::{LiquidityChange, LiquidityDirection, PendingAmount, UsdgSwap};
