use alloy::sol;

sol! {
    #![sol(all_derives)]
    /// `priceType` 0 is mark price, 1 is risk premium.
    event NotifyPendingAmount(uint8 priceType, address token, uint256 pendingUsd, uint256 pendingAmount);
}
