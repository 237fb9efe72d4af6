use thiserror::Error;

#[derive(Debug, Error)]
pub enum HumanityError {
    #[error("no verification record for {0}")]
    NotFound(String),

    #[error("verification token mismatch for {0}")]
    TokenMismatch(String),

    #[error("{0} has no current human verification")]
    NotVerified(String),

    #[error("verification token is empty")]
    EmptyToken,

    #[error("verification for {0} was never initiated")]
    VerificationNotFound(String),

    #[error("verification service unreachable: {0}")]
    Unreachable(String),

    #[error("verification service error: {0}")]
    Gateway(String),

    #[error("invalid response from verification service: {0}")]
    InvalidResponse(String),

    #[error("simulator server: {0}")]
    Server(#[from] std::io::Error),
}
