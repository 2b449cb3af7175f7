//! Job to deliver counter intents from the PostgreSQL outbox.
//!
//! Intents are written inside each range transaction and sent here in id
//! order. Only acknowledged intents are marked drained, so a failed send is
//! retried on the next tick under the same idempotency key.

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};

use crate::db::{models::PendingCounter, PostgresClient};

/// Source of undrained counter intents.
#[async_trait]
pub trait CounterOutbox: Send + Sync {
    async fn pending(&self, limit: i64) -> Result<Vec<PendingCounter>>;

    async fn mark_drained(&self, ids: &[i64]) -> Result<u64>;
}

/// Destination of counter increments.
#[async_trait]
pub trait CounterSink: Send + Sync {
    async fn publish_counter(&self, counter: &PendingCounter) -> Result<()>;
}

#[async_trait]
impl CounterOutbox for PostgresClient {
    async fn pending(&self, limit: i64) -> Result<Vec<PendingCounter>> {
        self.fetch_pending_counters(limit).await
    }

    async fn mark_drained(&self, ids: &[i64]) -> Result<u64> {
        self.mark_counters_drained(ids).await
    }
}

/// Drains the outbox until it is empty or a send fails.
///
/// Returns the number of intents delivered.
pub async fn run<O, K>(outbox: &O, sink: &K, batch_size: i64) -> Result<usize>
where
    O: CounterOutbox + ?Sized,
    K: CounterSink + ?Sized,
{
    let start = std::time::Instant::now();
    let mut delivered = 0;

    loop {
        let batch = outbox.pending(batch_size).await?;
        if batch.is_empty() {
            break;
        }

        let mut sent = Vec::with_capacity(batch.len());
        let mut failed = false;
        for counter in &batch {
            match sink.publish_counter(counter).await {
                Ok(()) => sent.push(counter.id),
                Err(e) => {
                    warn!(
                        "Counter {} not delivered, retrying next tick: {:#}",
                        counter.idempotency_key, e
                    );
                    failed = true;
                    break;
                },
            }
        }

        outbox.mark_drained(&sent).await?;
        delivered += sent.len();

        if failed || (batch.len() as i64) < batch_size {
            break;
        }
    }

    if delivered > 0 {
        info!(
            "Drained {} counter intents in {:?}",
            delivered,
            start.elapsed()
        );
    }
    Ok(delivered)
}
