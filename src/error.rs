//! Error taxonomy of the ingestion pipeline.

use alloy::primitives::{Address, B256};
use thiserror::Error;

use crate::{utils::OptionIdError, worker::LogPointer};

/// Failure of a ledger handler while applying one decoded event.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid option id: {0}")]
    OptionId(#[from] OptionIdError),
    #[error("no asset configured for underlying asset index {0}")]
    UnknownAsset(u16),
    #[error("{field} value {value} does not fit in 64 bits")]
    ValueOverflow { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Head, log or block fetch failed. Retried, never skipped.
    #[error("rpc request failed: {0}")]
    Rpc(String),

    /// Loading or committing ledger rows failed. Retried, never skipped.
    #[error("store operation failed: {0}")]
    Store(String),

    /// Subscribed log whose payload does not match its event ABI. Retried like a
    /// handler failure and dead-lettered once the range runs out of attempts.
    #[error("cannot decode {event} log {log} from {address}: {reason}")]
    Decode {
        log: LogPointer,
        address: Address,
        topic0: B256,
        event: &'static str,
        reason: String,
    },

    /// A handler rejected one log. Dead-lettered once the range runs out of attempts.
    #[error("{event} handler failed at {log}: {source}")]
    Handler {
        log: LogPointer,
        address: Address,
        topic0: B256,
        event: &'static str,
        #[source]
        source: LedgerError,
    },
}

impl IngestError {
    pub fn rpc(context: &str, error: impl std::fmt::Display) -> Self {
        Self::Rpc(format!("{}: {}", context, error))
    }

    pub fn store(error: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", error))
    }

    /// The single log this failure is attributed to, if any, with its reason.
    pub fn poison_log(&self) -> Option<(LogPointer, Address, B256, &'static str, String)> {
        match self {
            Self::Decode {
                log,
                address,
                topic0,
                event,
                reason,
            } => Some((*log, *address, *topic0, *event, reason.clone())),
            Self::Handler {
                log,
                address,
                topic0,
                event,
                source,
            } => Some((*log, *address, *topic0, *event, source.to_string())),
            Self::Rpc(_) | Self::Store(_) => None,
        }
    }
}
