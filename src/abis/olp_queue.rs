use alloy::sol;

// Liquidity queue for minting/redeeming the vault's LP token.
sol! {
    #![sol(all_derives)]
    event EnqueuedMintAndStake(uint256 index, uint8 actionType, address user, address token, uint256 amount, uint256 minOut, address receiver, bool isNative);
    event EnqueuedUnstakeAndRedeem(uint256 index, uint8 actionType, address user, address tokenOut, uint256 olpAmount, uint256 minOut, address receiver, bool isNative);
    event ProcessedQueueAction(uint256 index, uint8 actionType, address user, uint256 amountOut, uint256 olpPrice);
    event CancelledQueueAction(uint256 index, uint8 actionType, address user, uint8 reason);
}
