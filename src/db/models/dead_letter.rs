/// Log skipped after its range exhausted the retry budget (PostgreSQL)
///
/// Primary Key: (block_number, transaction_hash, log_index)
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
    pub address: String,
    pub topic0: String,
    pub event: String,
    pub reason: String,
    pub from_block: u64,
    pub to_block: u64,
}
