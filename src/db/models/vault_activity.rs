use bigdecimal::BigDecimal;

/// Direct vault swap of a token against USDG (PostgreSQL)
///
/// Primary Key: id = `{txHash}-{logIndex}`
#[derive(Debug, Clone, PartialEq)]
pub struct UsdgSwap {
    pub id: String,
    pub vault: String,
    /// `BuyUSDG` when true, `SellUSDG` otherwise
    pub is_buy: bool,
    pub account: String,
    pub token: String,
    pub token_amount: BigDecimal,
    pub usdg_amount: BigDecimal,
    pub fee_basis_points: BigDecimal,
    pub process_block_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityDirection {
    Add,
    Remove,
}

impl LiquidityDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

/// LP token mint or burn through an OLP manager (PostgreSQL)
///
/// `token_amount` is the amount deposited on add and paid out on remove;
/// `olp_amount` is the LP amount minted or burned.
///
/// Primary Key: id = `{txHash}-{logIndex}`
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityChange {
    pub id: String,
    pub direction: LiquidityDirection,
    pub account: String,
    /// LP token address, or the zero address for an unconfigured manager
    pub olp: String,
    pub token: String,
    pub token_amount: BigDecimal,
    pub olp_amount: BigDecimal,
    pub aum_in_usdg: BigDecimal,
    pub olp_supply: BigDecimal,
    pub usdg_amount: BigDecimal,
    pub process_block_time: u64,
}

/// Pending mark-price or risk-premium amount reported by vault utils (PostgreSQL)
///
/// Primary Key: id = `{txHash}-{logIndex}`
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAmount {
    pub id: String,
    pub vault_utils: String,
    pub price_type: u8,
    pub token: String,
    pub pending_usd: BigDecimal,
    pub pending_amount: BigDecimal,
    pub process_block_time: u64,
}
