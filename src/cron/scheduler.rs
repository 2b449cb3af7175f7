//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Draining the counter outbox to the counter sink

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::{config::OutboxSettings, db::Database, pubsub::RedpandaPublisher};

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    db: Arc<Database>,
    publisher: Option<Arc<RedpandaPublisher>>,
    settings: Arc<CronSettings>,
}

/// Configuration for cron job intervals
#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Interval for draining the counter outbox - default 5 seconds
    pub drain_outbox_interval_secs: u64,
    /// Intents fetched per outbox query
    pub drain_batch_size: i64,
}

impl Default for CronSettings {
    fn default() -> Self {
        OutboxSettings::default().into()
    }
}

impl From<OutboxSettings> for CronSettings {
    fn from(outbox: OutboxSettings) -> Self {
        Self {
            drain_outbox_interval_secs: outbox.drain_interval_secs,
            drain_batch_size: outbox.drain_batch_size,
        }
    }
}

impl CronScheduler {
    pub fn new(
        db: Arc<Database>,
        publisher: Option<Arc<RedpandaPublisher>>,
        settings: CronSettings,
    ) -> Self {
        Self {
            db,
            publisher,
            settings: Arc::new(settings),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        let mut registered = 0;
        match &self.publisher {
            Some(publisher) => {
                self.register_drain_counter_outbox_job(&scheduler, publisher.clone())
                    .await?;
                registered += 1;
            },
            None => {
                info!("No counter sink configured, counter intents stay in the outbox");
            },
        }

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", registered);

        // Wait for cancellation
        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_drain_counter_outbox_job(
        &self,
        scheduler: &JobScheduler,
        publisher: Arc<RedpandaPublisher>,
    ) -> Result<()> {
        let db = self.db.clone();
        let interval = self.settings.drain_outbox_interval_secs;
        let batch_size = self.settings.drain_batch_size;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let db = db.clone();
            let publisher = publisher.clone();
            Box::pin(async move {
                if let Err(e) =
                    jobs::drain_counter_outbox::run(db.postgres.as_ref(), publisher.as_ref(), batch_size)
                        .await
                {
                    error!("Failed to drain counter outbox: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered drain_counter_outbox job (every {}s)", interval);
        Ok(())
    }
}
