//! External humanity verification capability.

use async_trait::async_trait;
use poha_types::Address;

use crate::{HumanityError, TokenStatus};

/// A service that can prove an address belongs to a unique human.
///
/// The flow is initiate → the human follows [`verification_url`] → the node
/// polls [`verify_humanity`] with the token it was handed. While the human has
/// not finished, [`token_status`] reports the token as pending.
///
/// [`verification_url`]: HumanityGateway::verification_url
/// [`verify_humanity`]: HumanityGateway::verify_humanity
/// [`token_status`]: HumanityGateway::token_status
#[async_trait]
pub trait HumanityGateway: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Start a verification for `address` and return its token.
    async fn initiate_verification(&self, address: &Address) -> Result<String, HumanityError>;

    /// How `token` stands for `address`.
    ///
    /// Fails with `EmptyToken` for an empty token and `VerificationNotFound`
    /// when the service has never seen `address`.
    async fn token_status(
        &self,
        address: &Address,
        token: &str,
    ) -> Result<TokenStatus, HumanityError>;

    /// Whether `token` is a completed, current verification for `address`.
    async fn verify_humanity(&self, address: &Address, token: &str) -> Result<bool, HumanityError> {
        Ok(self.token_status(address, token).await? == TokenStatus::Verified)
    }

    /// Where a human completes the verification for `token`.
    fn verification_url(&self, address: &Address, token: &str) -> String;
}
