use alloy::sol;

sol! {
    #![sol(all_derives)]
    event CreateClosePosition(address account, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address[] path, uint256 minAmountOut, uint256 minOutWhenSwap, uint256 executionFee, uint256 index, uint40 blockTime);
    event CancelClosePosition(address account, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address[] path, uint40 timeGap);
}
