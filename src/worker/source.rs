//! Chain access behind the [`ChainSource`] seam.

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, Bytes, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
};
use anyhow::Context;
use async_trait::async_trait;
use url::Url;

use crate::{error::IngestError, worker::parser::LogPointer};

/// Raw log as returned by `eth_getLogs`, with the positional fields required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl RawLog {
    pub fn pointer(&self) -> LogPointer {
        LogPointer {
            block_number: self.block_number,
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
        }
    }
}

impl TryFrom<Log> for RawLog {
    type Error = IngestError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        let missing = |field: &str| IngestError::Rpc(format!("log without {}", field));
        Ok(Self {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number: log.block_number.ok_or_else(|| missing("block number"))?,
            transaction_hash: log.transaction_hash.ok_or_else(|| missing("transaction hash"))?,
            transaction_index: log
                .transaction_index
                .ok_or_else(|| missing("transaction index"))?,
            log_index: log.log_index.ok_or_else(|| missing("log index"))?,
        })
    }
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Latest block number.
    async fn head(&self) -> Result<u64, IngestError>;

    /// Logs of one contract in `[from_block, to_block]` whose topic0 is any of `topics`.
    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: Address,
        topics: &[B256],
    ) -> Result<Vec<RawLog>, IngestError>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, IngestError>;
}

/// JSON-RPC chain source.
pub struct RpcChainSource {
    provider: DynProvider,
}

impl RpcChainSource {
    pub fn new(rpc_url: &str) -> anyhow::Result<Self> {
        let url = Url::parse(rpc_url).context("Invalid RPC URL")?;
        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            provider: DynProvider::new(provider),
        })
    }
}

#[async_trait]
impl ChainSource for RpcChainSource {
    async fn head(&self) -> Result<u64, IngestError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| IngestError::rpc("eth_blockNumber", e))
    }

    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        address: Address,
        topics: &[B256],
    ) -> Result<Vec<RawLog>, IngestError> {
        let filter = Filter::new()
            .address(address)
            .event_signature(topics.to_vec())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| IngestError::rpc("eth_getLogs", e))?;

        logs.into_iter().map(RawLog::try_from).collect()
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, IngestError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .map_err(|e| IngestError::rpc("eth_getBlockByNumber", e))?
            .ok_or_else(|| IngestError::Rpc(format!("block {} not found", block_number)))?;

        Ok(block.header.timestamp)
    }
}
