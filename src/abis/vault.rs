use alloy::sol;

sol! {
    #![sol(all_derives)]
    event CollectFees(address token, uint256 feeUsd, uint256 feeAmount);
    event CollectPositionFees(address account, address token, uint256 feeUsd, uint256 feeAmount, bool isSettle);
    event BuyUSDG(address account, address token, uint256 tokenAmount, uint256 usdgAmount, uint256 feeBasisPoints);
    event SellUSDG(address account, address token, uint256 usdgAmount, uint256 tokenAmount, uint256 feeBasisPoints);
}
