use std::str::FromStr;

use bigdecimal::BigDecimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Enqueued,
    Processed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueued => "ENQUEUED",
            Self::Processed => "PROCESSED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENQUEUED" => Ok(Self::Enqueued),
            "PROCESSED" => Ok(Self::Processed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(anyhow::anyhow!("unknown queue status {:?}", other)),
        }
    }
}

/// Queued LP mint/redeem request (PostgreSQL)
///
/// Primary Key: id = `{queueAddress}-{queueIndex}`
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityQueueItem {
    pub id: String,
    pub queue_address: String,
    pub queue_index: String,
    pub action_type: u8,
    pub user: String,
    /// Token paid in (mint) or paid out (redeem)
    pub token: String,
    /// Token amount (mint) or LP amount (redeem)
    pub amount: BigDecimal,
    pub min_out: BigDecimal,
    pub receiver: String,
    pub is_native: bool,
    pub status: QueueStatus,
    pub amount_out: BigDecimal,
    pub olp_price: BigDecimal,
    pub cancel_reason: Option<u8>,
    pub enqueued_block_time: u64,
    pub process_block_time: u64,
}

impl LiquidityQueueItem {
    pub fn key(queue_address: &str, queue_index: &str) -> String {
        format!("{}-{}", queue_address, queue_index)
    }
}
