use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scanner sync progress (PostgreSQL)
///
/// Singleton row holding the last block whose range committed.
/// Used to resume scanning after restarts without missing or duplicating data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub block_number: u64,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(block_number: u64) -> Self {
        Self {
            block_number,
            updated_at: Utc::now(),
        }
    }

    /// First block of the next range.
    pub fn next_block(&self) -> u64 {
        self.block_number + 1
    }
}
