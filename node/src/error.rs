use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] poha_ledger::LedgerError),

    #[error("humanity error: {0}")]
    Humanity(#[from] poha_humanity::HumanityError),

    #[error("consensus error: {0}")]
    Consensus(#[from] poha_consensus::ConsensusError),

    #[error("network error: {0}")]
    Network(#[from] poha_network::NetworkError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("node already started")]
    AlreadyStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
