//! Pub/Sub messaging module for the ledger's side channels.
//!
//! Provides Redpanda (Kafka-compatible) integration for delivering counter
//! increments and mirroring the request-index watermark.

mod redpanda;

pub use redpanda::{CounterMessage, RedpandaPublisher};
