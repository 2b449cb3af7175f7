use alloy::sol;

// Mints and burns a vault's LP token against deposited tokens.
sol! {
    #![sol(all_derives)]
    event AddLiquidity(address account, address token, uint256 amount, uint256 aumInUsdg, uint256 olpSupply, uint256 usdgAmount, uint256 mintAmount);
    event RemoveLiquidity(address account, address token, uint256 olpAmount, uint256 aumInUsdg, uint256 olpSupply, uint256 usdgAmount, uint256 amountOut);
}
