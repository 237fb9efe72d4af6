use poha_humanity::HumanityError;
use poha_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("validator {0} is not in the validator set")]
    UnauthorizedValidator(String),

    #[error("{0} is not a registered validator")]
    NotAValidator(String),

    #[error("human verification required for {address}{}", url_hint(.url))]
    HumanVerificationRequired { address: String, url: Option<String> },

    #[error("invalid human proof from validator {0}")]
    InvalidHumanProof(String),

    #[error("invalid block: {reason}")]
    InvalidBlock { reason: String },

    #[error("previous hash mismatch: expected {expected}, got {got}")]
    PrevHashMismatch { expected: String, got: String },

    #[error("invalid block signature from {0}")]
    InvalidSignature(String),

    #[error("humanity: {0}")]
    Humanity(#[from] HumanityError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

fn url_hint(url: &Option<String>) -> String {
    url.as_ref()
        .map(|u| format!(" (complete it at {u})"))
        .unwrap_or_default()
}
