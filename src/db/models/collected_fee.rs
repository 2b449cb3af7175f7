use bigdecimal::BigDecimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeKind {
    /// Protocol-level fee collection (`CollectFees`)
    Protocol,
    /// Fee charged on a position trade or settlement (`CollectPositionFees`)
    Position,
}

impl FeeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Position => "position",
        }
    }
}

/// Vault fee collection (PostgreSQL)
///
/// Primary Key: id = `{txHash}-{logIndex}`
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedFee {
    pub id: String,
    pub kind: FeeKind,
    pub vault: String,
    pub account: Option<String>,
    pub token: String,
    pub fee_usd: BigDecimal,
    pub fee_amount: BigDecimal,
    pub is_settle: Option<bool>,
    pub process_block_time: u64,
}
