use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("block gap: expected index {expected}, got {got}")]
    BlockGap { expected: u64, got: u64 },

    #[error("block does not extend head {head}: prev_hash {prev_hash}")]
    NotOnHead { head: String, prev_hash: String },

    #[error("block {0} already in chain")]
    DuplicateBlock(String),

    #[error("transaction {0} already known")]
    DuplicateTransaction(String),

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    #[error("block rejected: {0}")]
    Rejected(String),
}
