//! Per-range log retrieval: one query per subscribed contract, decoded and
//! merged into chain order.

use std::sync::Arc;

use futures::future::try_join_all;
use log::{debug, warn};
use moka::future::Cache;
use rustc_hash::FxHashMap;

use crate::{
    error::IngestError,
    utils::{hex_encode, ALERT_TARGET},
    worker::{
        parser::{self, DecodedLog, LogPointer},
        registry::{AddressGroup, SubscriptionRegistry},
        source::ChainSource,
    },
};

/// Block timestamps never change, keep plenty of them around.
const TIMESTAMP_CACHE_CAPACITY: u64 = 100_000;

pub struct LogFetcher<S> {
    source: Arc<S>,
    timestamps: Cache<u64, u64>,
}

impl<S: ChainSource> LogFetcher<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            timestamps: Cache::builder()
                .max_capacity(TIMESTAMP_CACHE_CAPACITY)
                .build(),
        }
    }

    /// Every subscribed event in `[from_block, to_block]`, ordered by
    /// `(block, transaction index, log index)`.
    ///
    /// Logs matched by `skip` are left out before decoding. A log with an
    /// unsubscribed topic is alerted and dropped; a subscribed log that fails
    /// to decode fails the whole range.
    pub async fn fetch_range<F>(
        &self,
        from_block: u64,
        to_block: u64,
        registry: &SubscriptionRegistry,
        skip: F,
    ) -> Result<Vec<DecodedLog>, IngestError>
    where
        F: Fn(&LogPointer) -> bool + Sync,
    {
        let mut decoded = Vec::new();
        for group in registry.groups() {
            decoded.extend(self.fetch_group(from_block, to_block, group, &skip).await?);
        }

        decoded.sort_by_key(|log| log.meta.ordering_key());
        Ok(decoded)
    }

    async fn fetch_group<F>(
        &self,
        from_block: u64,
        to_block: u64,
        group: &AddressGroup,
        skip: &F,
    ) -> Result<Vec<DecodedLog>, IngestError>
    where
        F: Fn(&LogPointer) -> bool + Sync,
    {
        let logs = self
            .source
            .logs(from_block, to_block, group.address, &group.topics())
            .await?;

        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let mut blocks: Vec<u64> = logs.iter().map(|log| log.block_number).collect();
        blocks.sort_unstable();
        blocks.dedup();
        let timestamps = self.block_timestamps(&blocks).await?;

        let mut decoded = Vec::with_capacity(logs.len());
        for raw in logs.iter().filter(|raw| !skip(&raw.pointer())) {
            let Some(kind) = raw.topics.first().and_then(|topic| group.kind_for(topic)) else {
                warn!(
                    target: ALERT_TARGET,
                    "Skipping log with unsubscribed topic {:?} from {} at block {} (log {})",
                    raw.topics.first().map(|t| hex_encode(t.as_slice())),
                    raw.address,
                    raw.block_number,
                    raw.log_index
                );
                continue;
            };

            let block_timestamp = timestamps.get(&raw.block_number).copied().unwrap_or_default();
            decoded.push(parser::decode_log(kind, raw, block_timestamp)?);
        }

        debug!(
            "Fetched {} logs from {} in blocks {}..={}",
            decoded.len(),
            group.address,
            from_block,
            to_block
        );

        Ok(decoded)
    }

    /// Timestamps of `blocks`, fetched concurrently for cache misses.
    async fn block_timestamps(&self, blocks: &[u64]) -> Result<FxHashMap<u64, u64>, IngestError> {
        let mut resolved = FxHashMap::default();
        let mut missing = Vec::new();

        for &block in blocks {
            match self.timestamps.get(&block).await {
                Some(ts) => {
                    resolved.insert(block, ts);
                },
                None => missing.push(block),
            }
        }

        let fetched = try_join_all(missing.into_iter().map(|block| async move {
            self.source
                .block_timestamp(block)
                .await
                .map(|ts| (block, ts))
        }))
        .await?;

        for (block, ts) in fetched {
            self.timestamps.insert(block, ts).await;
            resolved.insert(block, ts);
        }

        Ok(resolved)
    }
}
