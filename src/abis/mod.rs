pub mod controller;
pub mod olp_manager;
pub mod olp_queue;
pub mod options_token;
pub mod position_manager;
pub mod settle_price_feed;
pub mod vault;
pub mod vault_utils;

pub use controller::{
    ClearPosition, CloseBuyPosition, CloseSellPosition, OpenBuyPosition, OpenSellPosition,
    SettleBuyPosition, SettleSellPosition,
};
pub use olp_manager::{AddLiquidity, RemoveLiquidity};
pub use olp_queue::{
    CancelledQueueAction, EnqueuedMintAndStake, EnqueuedUnstakeAndRedeem, ProcessedQueueAction,
};
pub use options_token::TransferSingle;
pub use position_manager::{CancelClosePosition, CreateClosePosition};
pub use settle_price_feed::FeedSettlePrice;
pub use vault::{BuyUSDG, CollectFees, CollectPositionFees, SellUSDG};
pub use vault_utils::NotifyPendingAmount;
