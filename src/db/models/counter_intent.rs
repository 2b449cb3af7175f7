use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// Outbox row for a side-channel counter increment (PostgreSQL)
///
/// Primary Key: idempotency_key = `{txHash}-{logIndex}-{seq}`
/// Written in the range transaction, drained to the counter sink later.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterIntent {
    pub idempotency_key: String,
    pub counter_key: String,
    pub delta: BigDecimal,
}

/// Undrained intent read back from the outbox.
#[derive(Debug, Clone)]
pub struct PendingCounter {
    pub id: i64,
    pub idempotency_key: String,
    pub counter_key: String,
    pub delta: String,
    pub created_at: DateTime<Utc>,
}
