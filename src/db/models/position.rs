use alloy::primitives::{Address, U256};
use bigdecimal::BigDecimal;
use num_traits::Zero;

use crate::utils::{address_key, option_names, Leg, OptionId};

/// Options position of one account in one option id (PostgreSQL)
///
/// Primary Key: id = `{account}-{optionTokenId}`
///
/// Size buckets obey
/// `size_opened + size_transferred_in == size + size_closing + size_closed
///  + size_settled + size_transferred_out`,
/// except for vault-owned positions whose closes skip `size_closing`.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: String,
    pub account: String,
    pub underlying_asset_index: u16,
    pub expiry: u64,
    pub option_token_id: String,

    // Decomposed option id
    pub length: u8,
    pub is_buys: String,
    pub strike_prices: String,
    pub is_calls: String,
    pub option_names: String,

    // Size buckets
    pub size: BigDecimal,
    pub size_opened: BigDecimal,
    pub size_closing: BigDecimal,
    pub size_closed: BigDecimal,
    pub size_settled: BigDecimal,
    pub size_transferred_in: BigDecimal,
    pub size_transferred_out: BigDecimal,

    pub is_buy: bool,
    /// Size-weighted running execution price over `size`
    pub execution_price: BigDecimal,

    pub opened_token: String,
    pub opened_amount: BigDecimal,
    pub opened_collateral_token: String,
    pub opened_collateral_amount: BigDecimal,
    pub opened_avg_execution_price: BigDecimal,
    pub opened_avg_spot_price: BigDecimal,

    pub closed_token: String,
    pub closed_amount: BigDecimal,
    pub closed_collateral_token: String,
    pub closed_collateral_amount: BigDecimal,
    pub closed_avg_execution_price: BigDecimal,
    pub closed_avg_spot_price: BigDecimal,

    pub settled_token: String,
    pub settled_amount: BigDecimal,
    pub settled_collateral_token: String,
    pub settled_collateral_amount: BigDecimal,
    pub settled_price: BigDecimal,

    pub is_settled: bool,
    pub last_process_block_time: u64,
}

impl Position {
    pub fn key(account: &Address, option_token_id: &U256) -> String {
        format!("{}-{}", address_key(account), option_token_id)
    }

    /// Empty position with its descriptive columns derived from the option id.
    pub fn new(
        account: &Address,
        option_token_id: &U256,
        option: &OptionId,
        ticker: &str,
        is_buy: bool,
    ) -> Self {
        let join = |f: fn(&Leg) -> String| option.legs.iter().map(f).collect::<Vec<_>>().join(",");

        Self {
            id: Self::key(account, option_token_id),
            account: address_key(account),
            underlying_asset_index: option.underlying_asset_index,
            expiry: option.expiry,
            option_token_id: option_token_id.to_string(),
            length: option.length,
            is_buys: join(|leg| leg.is_buy.to_string()),
            strike_prices: join(|leg| leg.strike_price.to_string()),
            is_calls: join(|leg| leg.is_call.to_string()),
            option_names: option_names(ticker, option),
            size: BigDecimal::zero(),
            size_opened: BigDecimal::zero(),
            size_closing: BigDecimal::zero(),
            size_closed: BigDecimal::zero(),
            size_settled: BigDecimal::zero(),
            size_transferred_in: BigDecimal::zero(),
            size_transferred_out: BigDecimal::zero(),
            is_buy,
            execution_price: BigDecimal::zero(),
            opened_token: String::new(),
            opened_amount: BigDecimal::zero(),
            opened_collateral_token: String::new(),
            opened_collateral_amount: BigDecimal::zero(),
            opened_avg_execution_price: BigDecimal::zero(),
            opened_avg_spot_price: BigDecimal::zero(),
            closed_token: String::new(),
            closed_amount: BigDecimal::zero(),
            closed_collateral_token: String::new(),
            closed_collateral_amount: BigDecimal::zero(),
            closed_avg_execution_price: BigDecimal::zero(),
            closed_avg_spot_price: BigDecimal::zero(),
            settled_token: String::new(),
            settled_amount: BigDecimal::zero(),
            settled_collateral_token: String::new(),
            settled_collateral_amount: BigDecimal::zero(),
            settled_price: BigDecimal::zero(),
            is_settled: false,
            last_process_block_time: 0,
        }
    }

    /// Size that entered the position minus size that left or is still open.
    pub fn size_imbalance(&self) -> BigDecimal {
        let inflow = &self.size_opened + &self.size_transferred_in;
        let outflow = &self.size
            + &self.size_closing
            + &self.size_closed
            + &self.size_settled
            + &self.size_transferred_out;
        inflow - outflow
    }
}
