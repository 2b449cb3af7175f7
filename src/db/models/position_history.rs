use bigdecimal::BigDecimal;
use num_traits::Zero;

/// Lifecycle transition recorded in position history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryKind {
    Open,
    CloseRequested,
    CloseCancelled,
    Close,
    Settle,
    Clear,
    TransferIn,
    TransferOut,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::CloseRequested => "closeRequested",
            Self::CloseCancelled => "closeCancelled",
            Self::Close => "close",
            Self::Settle => "settle",
            Self::Clear => "clear",
            Self::TransferIn => "transferIn",
            Self::TransferOut => "transferOut",
        }
    }
}

/// Append-only position history row (PostgreSQL)
///
/// Primary Key: (position_id, block_number, log_index)
/// `position_id` references `positions(id)`.
/// `id` is the display id `{position_id}-{block_timestamp}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHistory {
    pub id: String,
    pub position_id: String,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: String,
    pub kind: HistoryKind,

    pub account: String,
    /// `-1` for rows without a request (transfers)
    pub request_index: BigDecimal,
    pub underlying_asset_index: u16,
    pub expiry: u64,
    pub option_token_id: String,
    pub size: BigDecimal,

    pub quote_token: String,
    pub quote_amount: BigDecimal,
    pub collateral_token: String,
    pub collateral_amount: BigDecimal,

    pub execution_price: BigDecimal,
    pub avg_execution_price: BigDecimal,
    pub settle_price: BigDecimal,
    pub settle_payoff: BigDecimal,
    pub spot_price: BigDecimal,

    pub cash_flow: BigDecimal,
    pub pnl: BigDecimal,
    pub roi: BigDecimal,

    pub process_block_time: u64,
}

impl PositionHistory {
    /// Row for `kind` with every amount zeroed; handlers fill in what applies.
    pub fn blank(
        kind: HistoryKind,
        position_id: &str,
        block_number: u64,
        log_index: u64,
        transaction_hash: String,
        process_block_time: u64,
    ) -> Self {
        Self {
            id: format!("{}-{}", position_id, process_block_time),
            position_id: position_id.to_string(),
            block_number,
            log_index,
            transaction_hash,
            kind,
            account: String::new(),
            request_index: BigDecimal::zero(),
            underlying_asset_index: 0,
            expiry: 0,
            option_token_id: String::new(),
            size: BigDecimal::zero(),
            quote_token: String::new(),
            quote_amount: BigDecimal::zero(),
            collateral_token: String::new(),
            collateral_amount: BigDecimal::zero(),
            execution_price: BigDecimal::zero(),
            avg_execution_price: BigDecimal::zero(),
            settle_price: BigDecimal::zero(),
            settle_payoff: BigDecimal::zero(),
            spot_price: BigDecimal::zero(),
            cash_flow: BigDecimal::zero(),
            pnl: BigDecimal::zero(),
            roi: BigDecimal::zero(),
            process_block_time,
        }
    }
}
