use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::{
    config::ChainSettings,
    db::{
        models::{DeadLetter, SyncState},
        LedgerStore,
    },
    error::IngestError,
    ledger::{referenced_keys, LedgerBatch, LedgerContext},
    pubsub::RedpandaPublisher,
    utils::{address_key, hex_encode, ALERT_TARGET},
    worker::{
        fetcher::LogFetcher,
        parser::{DecodedLog, LogPointer},
        registry::SubscriptionRegistry,
        source::ChainSource,
    },
};

/// Interval for logging progress updates (10 seconds)
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ScannerSettings {
    pub start_block: u64,
    pub batch_size: u64,
    pub poll_interval: Duration,
    pub max_range_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl From<&ChainSettings> for ScannerSettings {
    fn from(chain: &ChainSettings) -> Self {
        Self {
            start_block: chain.start_block,
            batch_size: chain.batch_size,
            poll_interval: Duration::from_millis(chain.poll_interval_ms),
            max_range_attempts: chain.max_range_attempts.max(1),
            retry_base_delay: Duration::from_millis(chain.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(chain.retry_max_delay_ms),
        }
    }
}

/// Outcome of one scanner iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Head is behind the next block, nothing to do yet.
    CaughtUp,
    Committed {
        from_block: u64,
        to_block: u64,
        logs: usize,
    },
}

/// Failure bookkeeping of the range starting at one block.
#[derive(Debug, Default)]
pub struct RangeRetry {
    pub attempts: u32,
    /// Logs dead-lettered for this range, left out of every later attempt
    pub skipped: FxHashMap<LogPointer, DeadLetter>,
    to_block: u64,
}

/// Drives the ledger forward one block range at a time.
///
/// Each range is fetched, applied to a fresh [`LedgerBatch`] and committed
/// together with the cursor. A failed range leaves nothing behind and is
/// retried from the same block.
pub struct Scanner<S, L> {
    source: Arc<S>,
    fetcher: LogFetcher<S>,
    store: Arc<L>,
    registry: SubscriptionRegistry,
    ctx: LedgerContext,
    settings: ScannerSettings,
    publisher: Option<Arc<RedpandaPublisher>>,
}

impl<S: ChainSource, L: LedgerStore> Scanner<S, L> {
    pub fn new(
        source: Arc<S>,
        store: Arc<L>,
        registry: SubscriptionRegistry,
        ctx: LedgerContext,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            fetcher: LogFetcher::new(source.clone()),
            source,
            store,
            registry,
            ctx,
            settings,
            publisher: None,
        }
    }

    /// Mirror the watermark to Redpanda after every commit that moved it.
    pub fn with_publisher(mut self, publisher: Option<Arc<RedpandaPublisher>>) -> Self {
        self.publisher = publisher;
        self
    }

    /// First block of the next range: one past the cursor, or the configured start.
    pub async fn resume_block(&self) -> Result<u64, IngestError> {
        let state = self
            .store
            .load_sync_state()
            .await
            .map_err(IngestError::store)?;

        Ok(state
            .map(|s| s.next_block())
            .unwrap_or(self.settings.start_block))
    }

    /// Process the range starting at `from_block`.
    pub async fn step(&self, from_block: u64, retry: &mut RangeRetry) -> Result<Step, IngestError> {
        let head = self.source.head().await?;
        let to_block = from_block.saturating_add(self.settings.batch_size).min(head);
        if to_block < from_block {
            return Ok(Step::CaughtUp);
        }
        retry.to_block = to_block;

        let skipped = &retry.skipped;
        let logs = self
            .fetcher
            .fetch_range(from_block, to_block, &self.registry, |log| {
                skipped.contains_key(log)
            })
            .await?;

        self.apply_and_commit(from_block, to_block, &logs, retry)
            .await?;

        Ok(Step::Committed {
            from_block,
            to_block,
            logs: logs.len(),
        })
    }

    async fn apply_and_commit(
        &self,
        from_block: u64,
        to_block: u64,
        logs: &[DecodedLog],
        retry: &RangeRetry,
    ) -> Result<(), IngestError> {
        let keys = referenced_keys(logs);
        let positions = self
            .store
            .load_positions(&keys.positions)
            .await
            .map_err(IngestError::store)?;
        let queue_items = self
            .store
            .load_queue_items(&keys.queue_items)
            .await
            .map_err(IngestError::store)?;

        let mut batch = LedgerBatch::new(&self.ctx, positions, queue_items);
        for log in logs {
            batch.apply(log).map_err(|source| IngestError::Handler {
                log: log.meta.pointer(),
                address: log.meta.address,
                topic0: log.meta.kind.topic(),
                event: log.meta.kind.name(),
                source,
            })?;
        }

        let mut changes = batch.into_changes();
        changes.dead_letters = retry.skipped.values().cloned().collect();

        self.store
            .commit_range(&changes, &SyncState::new(to_block))
            .await
            .map_err(IngestError::store)?;

        if !changes.is_empty() {
            debug!(
                "Committed blocks {}..={}: {} logs, {} positions, {} history rows",
                from_block,
                to_block,
                logs.len(),
                changes.positions.len(),
                changes.history.len()
            );
        }

        if let (Some(publisher), Some(watermark)) = (&self.publisher, &changes.watermark) {
            publisher.publish_watermark(watermark).await;
        }

        Ok(())
    }

    /// Record a failed attempt of the range at `from_block` and return how
    /// long to wait before the next one.
    ///
    /// A handler or decode failure that keeps recurring dead-letters its log,
    /// after which the range is re-run at once without it. RPC and store
    /// failures only back off.
    pub fn on_range_failure(
        &self,
        from_block: u64,
        retry: &mut RangeRetry,
        err: IngestError,
    ) -> Duration {
        retry.attempts += 1;

        if let Some((log, address, topic0, event, reason)) = err.poison_log() {
            if retry.attempts >= self.settings.max_range_attempts {
                error!(
                    target: ALERT_TARGET,
                    "Dead-lettering {} log at {} after {} attempts: {}",
                    event, log, retry.attempts, reason
                );
                retry.skipped.insert(
                    log,
                    DeadLetter {
                        block_number: log.block_number,
                        transaction_hash: hex_encode(log.transaction_hash.as_slice()),
                        log_index: log.log_index,
                        address: address_key(&address),
                        topic0: hex_encode(topic0.as_slice()),
                        event: event.to_string(),
                        reason,
                        from_block,
                        to_block: retry.to_block,
                    },
                );
                retry.attempts = 0;
                return Duration::ZERO;
            }
        }

        let delay = self.backoff(retry.attempts);
        warn!(
            "Range from block {} failed (attempt {}), retrying in {:?}: {}",
            from_block, retry.attempts, delay, err
        );
        delay
    }

    /// `base * 2^(attempt - 1)`, capped at the configured maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.settings
            .retry_base_delay
            .saturating_mul(factor)
            .min(self.settings.retry_max_delay)
    }

    /// Load the resume block, backing off on store failures. `None` when
    /// cancelled first.
    async fn resume_block_with_retry(&self, cancellation_token: &CancellationToken) -> Option<u64> {
        let mut attempt = 0;
        loop {
            match self.resume_block().await {
                Ok(block) => return Some(block),
                Err(e) => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "Loading sync cursor failed (attempt {}), retrying in {:?}: {}",
                        attempt, delay, e
                    );
                    tokio::select! {
                        _ = cancellation_token.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {},
                    }
                },
            }
        }
    }

    /// Scan until cancelled. Cancellation is observed between ranges and
    /// during waits; an interrupted range is simply not committed.
    pub async fn run(&self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let Some(mut from_block) = self.resume_block_with_retry(&cancellation_token).await else {
            info!("Scanner cancelled before loading its cursor");
            return Ok(());
        };
        let mut retry = RangeRetry::default();
        let mut last_progress_log = Instant::now();

        info!(
            "Scanner starting at block {} ({} subscriptions)",
            from_block,
            self.registry.len()
        );

        loop {
            // Check cancellation at the start of each loop
            if cancellation_token.is_cancelled() {
                info!("Scanner received cancellation signal at block {}", from_block);
                break;
            }

            let delay = match self.step(from_block, &mut retry).await {
                Ok(Step::CaughtUp) => self.settings.poll_interval,
                Ok(Step::Committed { to_block, .. }) => {
                    from_block = to_block + 1;
                    retry = RangeRetry::default();

                    // Log progress every PROGRESS_LOG_INTERVAL seconds to reduce noise
                    if last_progress_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                        info!("Synced to block {}", to_block);
                        last_progress_log = Instant::now();
                    }
                    Duration::ZERO
                },
                Err(e) => self.on_range_failure(from_block, &mut retry, e),
            };

            if !delay.is_zero() {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {},
                    _ = tokio::time::sleep(delay) => {},
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy::sol_types::SolEvent;
    use bigdecimal::BigDecimal;

    use super::*;
    use crate::{
        abis::controller,
        db::{memory::MemoryStore, models::Position},
        testing::*,
    };

    fn scanner(chain: Arc<MockChain>, store: Arc<MemoryStore>) -> Scanner<MockChain, MemoryStore> {
        let settings = settings();
        Scanner::new(
            chain,
            store,
            SubscriptionRegistry::from_contracts(&settings.contracts).unwrap(),
            ledger_context(),
            ScannerSettings::from(&settings.chain),
        )
    }

    /// Ten logs in blocks 10..=19; the seventh opens a malformed option when `poison` is set.
    fn ten_logs(chain: &MockChain, poison: bool) {
        let option = btc_call(60_000);
        for i in 0..10u64 {
            let id = if poison && i == 6 { malformed_option() } else { option };
            let event = open_buy(ALICE, id, 1 + i, price(100 + i), price(60_000), i);
            chain.push_log(raw_of(&decoded(event, 10 + i, 0)));
        }
    }

    #[tokio::test]
    async fn test_caught_up_does_not_commit() {
        let chain = Arc::new(MockChain::new(5));
        let store = Arc::new(MemoryStore::new());
        let scanner = scanner(chain, store.clone());

        let step = scanner.step(6, &mut RangeRetry::default()).await.unwrap();

        assert_eq!(step, Step::CaughtUp);
        assert_eq!(store.commits(), 0);
        assert_eq!(store.cursor(), None);
    }

    #[tokio::test]
    async fn test_commit_advances_cursor() {
        let chain = Arc::new(MockChain::new(250));
        ten_logs(&chain, false);
        let store = Arc::new(MemoryStore::new());
        let scanner = scanner(chain, store.clone());

        assert_eq!(scanner.resume_block().await.unwrap(), 0);
        let step = scanner.step(0, &mut RangeRetry::default()).await.unwrap();

        // batch_size 100: [0, 100]
        assert_eq!(
            step,
            Step::Committed {
                from_block: 0,
                to_block: 100,
                logs: 10,
            }
        );
        assert_eq!(store.cursor(), Some(100));
        assert_eq!(scanner.resume_block().await.unwrap(), 101);

        let state = store.snapshot();
        let position = &state.positions[&Position::key(&ALICE, &btc_call(60_000))];
        assert_eq!(position.size_opened, BigDecimal::from(55u64));
        assert_eq!(state.history.len(), 10);
    }

    #[tokio::test]
    async fn test_handler_failure_persists_nothing() {
        let chain = Arc::new(MockChain::new(100));
        ten_logs(&chain, true);
        let store = Arc::new(MemoryStore::new());
        let scanner = scanner(chain, store.clone());

        let err = scanner.step(0, &mut RangeRetry::default()).await.unwrap_err();

        match err {
            IngestError::Handler { log, event, .. } => {
                assert_eq!(log.block_number, 16);
                assert_eq!(event, "OpenBuyPosition");
            },
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.commits(), 0);
        assert_eq!(store.snapshot(), Default::default());
    }

    #[tokio::test]
    async fn test_rerun_is_deterministic() {
        let chain = Arc::new(MockChain::new(100));
        ten_logs(&chain, false);

        let first = Arc::new(MemoryStore::new());
        let second = Arc::new(MemoryStore::new());
        // The second store rejects its first commit, so the range runs twice.
        second.fail_commits(1);

        scanner(chain.clone(), first.clone())
            .step(0, &mut RangeRetry::default())
            .await
            .unwrap();

        let retried = scanner(chain, second.clone());
        let mut retry = RangeRetry::default();
        let err = retried.step(0, &mut retry).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
        retried.step(0, &mut retry).await.unwrap();

        assert_eq!(first.snapshot(), second.snapshot());
    }

    #[tokio::test]
    async fn test_poison_log_is_dead_lettered() {
        let chain = Arc::new(MockChain::new(100));
        ten_logs(&chain, true);
        let store = Arc::new(MemoryStore::new());
        let scanner = scanner(chain, store.clone());
        let mut retry = RangeRetry::default();

        // max_range_attempts is 3
        for attempt in 1..=3 {
            let err = scanner.step(0, &mut retry).await.unwrap_err();
            let delay = scanner.on_range_failure(0, &mut retry, err);
            if attempt < 3 {
                assert!(!delay.is_zero());
                assert!(retry.skipped.is_empty());
            } else {
                assert!(delay.is_zero());
            }
        }
        assert_eq!(retry.skipped.len(), 1);

        let step = scanner.step(0, &mut retry).await.unwrap();
        assert!(matches!(step, Step::Committed { logs: 9, .. }));

        let state = store.snapshot();
        assert_eq!(state.dead_letters.len(), 1);
        let letter = &state.dead_letters[0];
        assert_eq!(letter.block_number, 16);
        assert_eq!(letter.event, "OpenBuyPosition");
        assert_eq!(letter.address, address_key(&CONTROLLER));
        assert_eq!((letter.from_block, letter.to_block), (0, 100));
        assert_eq!(state.history.len(), 9);
        assert_eq!(state.cursor, Some(100));
    }

    #[tokio::test]
    async fn test_undecodable_log_is_dead_lettered() {
        let chain = Arc::new(MockChain::new(100));
        let option = btc_call(60_000);
        chain.push_log(raw_of(&decoded(
            open_buy(ALICE, option, 2, price(100), price(60_000), 1),
            10,
            0,
        )));
        // Subscribed topic with a payload too short for the event.
        chain.push_raw(
            CONTROLLER,
            11,
            0,
            0,
            vec![controller::OpenBuyPosition::SIGNATURE_HASH],
            vec![0u8; 10],
        );
        let store = Arc::new(MemoryStore::new());
        let scanner = scanner(chain, store.clone());
        let mut retry = RangeRetry::default();

        for attempt in 1..=3 {
            let err = scanner.step(0, &mut retry).await.unwrap_err();
            assert!(matches!(err, IngestError::Decode { .. }));
            let delay = scanner.on_range_failure(0, &mut retry, err);
            assert_eq!(delay.is_zero(), attempt == 3);
        }
        assert_eq!(store.commits(), 0);

        let step = scanner.step(0, &mut retry).await.unwrap();
        assert!(matches!(step, Step::Committed { logs: 1, .. }));

        let state = store.snapshot();
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.dead_letters.len(), 1);
        let letter = &state.dead_letters[0];
        assert_eq!((letter.block_number, letter.log_index), (11, 0));
        assert_eq!(letter.event, "OpenBuyPosition");
        assert_eq!(
            letter.topic0,
            hex_encode(controller::OpenBuyPosition::SIGNATURE_HASH.as_slice())
        );
        assert!(!letter.reason.is_empty());
        assert_eq!(state.cursor, Some(100));
    }

    #[tokio::test]
    async fn test_store_failures_are_never_skipped() {
        let chain = Arc::new(MockChain::new(100));
        ten_logs(&chain, false);
        let store = Arc::new(MemoryStore::new());
        store.fail_commits(10);
        let scanner = scanner(chain, store.clone());
        let mut retry = RangeRetry::default();

        for _ in 0..5 {
            let err = scanner.step(0, &mut retry).await.unwrap_err();
            let delay = scanner.on_range_failure(0, &mut retry, err);
            assert!(!delay.is_zero());
        }

        assert_eq!(retry.attempts, 5);
        assert!(retry.skipped.is_empty());
        assert_eq!(store.cursor(), None);
    }

    #[tokio::test]
    async fn test_rpc_failure_is_retried() {
        let chain = Arc::new(MockChain::new(100));
        ten_logs(&chain, false);
        chain.fail_logs(true);
        let store = Arc::new(MemoryStore::new());
        let scanner = scanner(chain.clone(), store.clone());
        let mut retry = RangeRetry::default();

        let err = scanner.step(0, &mut retry).await.unwrap_err();
        assert!(matches!(err, IngestError::Rpc(_)));
        scanner.on_range_failure(0, &mut retry, err);

        chain.fail_logs(false);
        scanner.step(0, &mut retry).await.unwrap();
        assert_eq!(store.cursor(), Some(100));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let scanner = scanner(Arc::new(MockChain::new(0)), Arc::new(MemoryStore::new()));

        // base 10ms, cap 40ms
        assert_eq!(scanner.backoff(1), Duration::from_millis(10));
        assert_eq!(scanner.backoff(2), Duration::from_millis(20));
        assert_eq!(scanner.backoff(3), Duration::from_millis(40));
        assert_eq!(scanner.backoff(4), Duration::from_millis(40));
        assert_eq!(scanner.backoff(64), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_run_follows_head_until_cancelled() {
        let chain = Arc::new(MockChain::new(150));
        ten_logs(&chain, false);
        let option = btc_call(60_000);
        chain.push_log(raw_of(&decoded(
            open_buy(BOB, option, 4, price(120), price(60_000), 20),
            140,
            0,
        )));
        let store = Arc::new(MemoryStore::new());
        let scanner = Arc::new(scanner(chain.clone(), store.clone()));

        let token = CancellationToken::new();
        let handle = {
            let scanner = scanner.clone();
            let token = token.clone();
            tokio::spawn(async move { scanner.run(token).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.cursor() != Some(150) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        token.cancel();
        handle.await.unwrap().unwrap();

        let state = store.snapshot();
        assert_eq!(state.history.len(), 11);
        assert_eq!(
            state.positions[&Position::key(&BOB, &option)].size,
            BigDecimal::from(4u64)
        );
        // [0, 100] then [101, 150]
        assert_eq!(store.commits(), 2);
    }

    #[tokio::test]
    async fn test_run_retries_cursor_load() {
        let chain = Arc::new(MockChain::new(100));
        ten_logs(&chain, false);
        let store = Arc::new(MemoryStore::new());
        store.fail_loads(2);
        let scanner = Arc::new(scanner(chain, store.clone()));

        let token = CancellationToken::new();
        let handle = {
            let scanner = scanner.clone();
            let token = token.clone();
            tokio::spawn(async move { scanner.run(token).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.cursor() != Some(100) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        token.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(store.snapshot().history.len(), 10);
    }

    #[tokio::test]
    async fn test_run_stops_while_cursor_unavailable() {
        let store = Arc::new(MemoryStore::new());
        store.fail_loads(usize::MAX);
        let scanner = scanner(Arc::new(MockChain::new(100)), store.clone());

        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), scanner.run(token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.commits(), 0);
    }
}
