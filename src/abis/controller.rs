use alloy::sol;

// Position lifecycle events emitted by the options controller.
sol! {
    #![sol(all_derives)]
    event OpenBuyPosition(address account, uint256 requestIndex, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address quoteToken, uint256 amountPaid, uint256 executionPrice, uint256 spotPrice);
    event OpenSellPosition(address account, uint256 requestIndex, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address quoteToken, uint256 amountReceived, address collateralToken, uint256 collateralAmount, uint256 executionPrice, uint256 spotPrice);
    event CloseBuyPosition(address account, uint256 requestIndex, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address quoteToken, uint256 amountReceived, uint256 executionPrice, uint256 spotPrice);
    event CloseSellPosition(address account, uint256 requestIndex, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address quoteToken, uint256 amountPaid, address collateralToken, uint256 collateralAmount, uint256 executionPrice, uint256 spotPrice);
    event SettleBuyPosition(address account, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address quoteToken, uint256 amountReceived, uint256 settlePrice);
    event SettleSellPosition(address account, uint16 underlyingAssetIndex, uint40 expiry, uint256 optionTokenId, uint256 size, address quoteToken, uint256 amountPaid, address collateralToken, uint256 collateralAmount, uint256 settlePrice);
    event ClearPosition(address vault, address counterparty, uint256 optionTokenId, uint256 oppositeOptionTokenId, uint256 sizeToClear);
}
