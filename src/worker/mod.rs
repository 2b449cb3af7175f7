//! Ingestion pipeline: chain access, log decoding and the block-range scanner.

pub mod fetcher;
pub mod parser;
pub mod registry;
pub mod scanner;
pub mod source;

pub use fetcher::LogFetcher;
pub use parser::{decode_log, DecodedLog, LedgerEvent, LogMeta, LogPointer};
pub use registry::{EventKind, Subscription, SubscriptionRegistry};
pub use scanner::{RangeRetry, Scanner, ScannerSettings, Step};
pub use source::{ChainSource, RawLog, RpcChainSource};
