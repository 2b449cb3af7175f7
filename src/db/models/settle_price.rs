use bigdecimal::BigDecimal;

/// Settlement price published by the settle-price feed (PostgreSQL)
///
/// Primary Key: id = `{txHash}-{logIndex}`
#[derive(Debug, Clone, PartialEq)]
pub struct SettlePrice {
    pub id: String,
    pub underlying_asset: String,
    pub expiry: u64,
    pub settle_price: BigDecimal,
    pub process_block_time: u64,
}
