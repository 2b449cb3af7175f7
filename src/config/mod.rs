#[allow(clippy::module_inception)]
mod config;

pub use config::{
    AssetSettings, ChainSettings, ContractSettings, OlpSettings, OutboxSettings,
    PostgresSettings, RedpandaSettings, Settings, TokenSettings, VaultSettings,
};
