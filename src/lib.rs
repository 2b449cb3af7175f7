pub mod abis;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod ledger;
pub mod pubsub;
pub mod utils;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use db::Database;
pub use ledger::LedgerContext;
pub use pubsub::RedpandaPublisher;
pub use worker::{RpcChainSource, Scanner, ScannerSettings, SubscriptionRegistry};
