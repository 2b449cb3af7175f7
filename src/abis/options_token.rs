use alloy::sol;

// ERC1155 single transfer. Option positions are ERC1155 balances keyed by option id.
sol! {
    #![sol(all_derives)]
    event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
}
