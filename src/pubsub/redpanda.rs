//! Redpanda (Kafka-compatible) publisher implementation.
//!
//! Delivers drained counter intents and mirrors the request-index watermark.
//! Counter sends report delivery so the outbox only marks what the broker
//! acknowledged; watermark sends are fire-and-forget.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{error, info, warn};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use serde::Serialize;

use crate::config::RedpandaSettings;
use crate::cron::jobs::drain_counter_outbox::CounterSink;
use crate::db::models::{PendingCounter, RequestIndexWatermark};

/// Wire form of one counter increment.
#[derive(Debug, Serialize)]
pub struct CounterMessage<'a> {
    pub key: &'a str,
    pub counter: &'a str,
    pub delta: &'a str,
}

impl<'a> From<&'a PendingCounter> for CounterMessage<'a> {
    fn from(counter: &'a PendingCounter) -> Self {
        Self {
            key: &counter.idempotency_key,
            counter: &counter.counter_key,
            delta: &counter.delta,
        }
    }
}

/// Redpanda publisher for the ledger's side channels.
///
/// Topics: `{prefix}.counters` keyed by idempotency key, and
/// `{prefix}.watermark` with a single fixed key.
pub struct RedpandaPublisher {
    producer: FutureProducer,
    topic_prefix: String,
}

impl RedpandaPublisher {
    /// Create a new Redpanda publisher.
    ///
    /// Returns None if Redpanda is disabled in settings or connection fails.
    pub fn new(settings: &RedpandaSettings) -> Option<Self> {
        if !settings.enabled {
            info!("Redpanda publishing is disabled");
            return None;
        }

        info!("Connecting to Redpanda brokers: {}", settings.brokers);

        let producer: FutureProducer = match ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .set("linger.ms", "5")
            .create()
        {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to create Redpanda producer: {}", e);
                return None;
            },
        };

        info!(
            "Redpanda publisher initialized with topic prefix: {}",
            settings.topic_prefix
        );

        Some(Self {
            producer,
            topic_prefix: settings.topic_prefix.clone(),
        })
    }

    fn topic(&self, name: &str) -> String {
        format!("{}.{}", self.topic_prefix, name)
    }

    /// Mirror the latest watermark. Errors are logged, never returned.
    pub async fn publish_watermark(&self, watermark: &RequestIndexWatermark) {
        let topic = self.topic("watermark");
        if let Err(e) = self.publish_message(&topic, "watermark", watermark).await {
            warn!("{:#}", e);
        }
    }

    /// Publish a single message and wait for the broker's acknowledgement.
    async fn publish_message<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| anyhow!("Failed to serialize message for {}: {}", topic, e))?;

        let record = FutureRecord::to(topic).key(key).payload(&payload);

        self.producer
            .send(record, Duration::from_millis(500))
            .await
            .map(|_| ())
            .map_err(|(e, _)| anyhow!("Failed to send message to {}: {}", topic, e))
    }

    /// Flush any pending messages (call on shutdown).
    pub fn flush(&self) {
        self.producer.flush(Duration::from_secs(5)).ok();
    }
}

#[async_trait]
impl CounterSink for RedpandaPublisher {
    async fn publish_counter(&self, counter: &PendingCounter) -> anyhow::Result<()> {
        let topic = self.topic("counters");
        self.publish_message(&topic, &counter.idempotency_key, &CounterMessage::from(counter))
            .await
    }
}

impl Drop for RedpandaPublisher {
    fn drop(&mut self) {
        self.flush();
    }
}
