use alloy::sol;

sol! {
    #![sol(all_derives)]
    event FeedSettlePrice(address underlyingAsset, uint256 expiry, uint256 settlePrice, address sender);
}
