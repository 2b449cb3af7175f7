use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Positions and their append-only history
/// - Daily aggregates and the request-index watermark
/// - The counter outbox and dead-lettered logs
/// - The sync cursor
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Chain RPC and block-range scanning configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    /// First block to scan when no cursor has been persisted yet
    pub start_block: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Failed attempts of one range before a poison log is dead-lettered
    #[serde(default = "default_max_range_attempts")]
    pub max_range_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_batch_size() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_range_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

/// A liquidity vault. Vaults are listed in source-vault-index order.
#[derive(Debug, Deserialize, Clone)]
pub struct VaultSettings {
    pub name: String,
    pub address: String,
    /// LP token of the vault, with the contracts that mint it and report its pending amounts
    #[serde(default)]
    pub olp: Option<OlpSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OlpSettings {
    /// Counter key segment, e.g. `sOlp`
    pub name: String,
    pub address: String,
    pub manager: String,
    pub vault_utils: String,
}

/// Addresses of every contract the scanner subscribes to.
#[derive(Debug, Deserialize, Clone)]
pub struct ContractSettings {
    pub controller: String,
    pub position_manager: String,
    pub settle_manager: String,
    pub settle_price_feed: String,
    #[serde(default)]
    pub vaults: Vec<VaultSettings>,
    #[serde(default)]
    pub options_tokens: Vec<String>,
    #[serde(default)]
    pub olp_queues: Vec<String>,
}

/// Underlying asset addressed by its index inside option identifiers.
#[derive(Debug, Deserialize, Clone)]
pub struct AssetSettings {
    pub index: u16,
    pub ticker: String,
    pub address: String,
    pub decimals: u8,
}

/// Additional ERC20 token (quote/fee tokens) known by ticker and decimals.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenSettings {
    pub address: String,
    pub ticker: String,
    pub decimals: u8,
}

/// Counter outbox drain configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct OutboxSettings {
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    #[serde(default = "default_drain_batch_size")]
    pub drain_batch_size: i64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval_secs(),
            drain_batch_size: default_drain_batch_size(),
        }
    }
}

fn default_drain_interval_secs() -> u64 {
    5
}

fn default_drain_batch_size() -> i64 {
    500
}

/// Redpanda (Kafka-compatible) pub/sub configuration.
///
/// When enabled, drained counter intents and the request-index watermark
/// are streamed to Redpanda topics for external consumers.
#[derive(Debug, Deserialize, Clone)]
pub struct RedpandaSettings {
    /// Enable/disable Redpanda publishing
    #[serde(default)]
    pub enabled: bool,
    /// Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[serde(default = "default_redpanda_brokers")]
    pub brokers: String,
    /// Topic name prefix (topics: {prefix}.counters, {prefix}.watermark)
    #[serde(default = "default_redpanda_topic_prefix")]
    pub topic_prefix: String,
}

fn default_redpanda_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_redpanda_topic_prefix() -> String {
    "optledger".to_string()
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, with `OPTLEDGER__`-prefixed
/// environment variables layered on top (e.g. `OPTLEDGER__POSTGRES__PASSWORD`).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chain: ChainSettings,
    pub contracts: ContractSettings,
    pub assets: Vec<AssetSettings>,
    #[serde(default)]
    pub tokens: Vec<TokenSettings>,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub redpanda: Option<RedpandaSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("OPTLEDGER").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
