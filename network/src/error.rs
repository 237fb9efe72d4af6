use poha_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {peer} failed: {reason}")]
    ConnectionFailed { peer: String, reason: String },

    #[error("{op} timed out for {peer}")]
    Timeout { op: &'static str, peer: String },

    #[error("message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },

    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("no handler for message type {0:?}")]
    UnknownMessageType(String),

    #[error("peer limit of {0} reached")]
    PeerLimit(usize),

    #[error("network already started")]
    AlreadyStarted,

    #[error("ledger rejected message: {0}")]
    Ledger(#[from] LedgerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
