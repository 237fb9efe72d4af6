//! Where human proofs are checked.

use std::sync::Arc;

use poha_humanity::{HumanityGateway, HumanityRegistry, RemoteGateway, SimulatorGateway};
use poha_types::Address;
use tracing::debug;

/// The humanity backend, chosen once when the node is built.
#[derive(Clone)]
pub enum HumanityVerifier {
    /// The node's own registry.
    Internal(Arc<HumanityRegistry>),
    /// A local simulator service.
    Simulator(Arc<SimulatorGateway>),
    /// An external verification service.
    Remote(Arc<RemoteGateway>),
}

impl HumanityVerifier {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Internal(_) => "internal",
            Self::Simulator(gw) => gw.name(),
            Self::Remote(gw) => gw.name(),
        }
    }

    /// The gateway behind an external verifier; `None` for the registry.
    pub fn gateway(&self) -> Option<&dyn HumanityGateway> {
        match self {
            Self::Internal(_) => None,
            Self::Simulator(gw) => Some(gw.as_ref()),
            Self::Remote(gw) => Some(gw.as_ref()),
        }
    }

    /// Whether `proof` is a current human verification for `validator`.
    /// Gateway errors count as a failed check.
    pub async fn validate_human_proof(&self, validator: &Address, proof: &str) -> bool {
        match self {
            Self::Internal(registry) => registry.validate_proof(validator, proof),
            Self::Simulator(gw) => check_with(gw.as_ref(), validator, proof).await,
            Self::Remote(gw) => check_with(gw.as_ref(), validator, proof).await,
        }
    }
}

async fn check_with(
    gateway: &dyn HumanityGateway,
    address: &Address,
    token: &str,
) -> bool {
    match gateway.verify_humanity(address, token).await {
        Ok(verified) => verified,
        Err(e) => {
            debug!(%address, gateway = gateway.name(), "humanity check failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poha_humanity::RegistryConfig;

    #[tokio::test]
    async fn internal_requires_exact_verified_token() {
        let registry = Arc::new(HumanityRegistry::new(RegistryConfig::default()));
        let verifier = HumanityVerifier::Internal(Arc::clone(&registry));
        let v1 = Address::from("V1");

        let token = registry.register_verification(&v1);
        assert!(!verifier.validate_human_proof(&v1, &token).await);

        registry.complete_verification(&v1, &token).unwrap();
        assert!(verifier.validate_human_proof(&v1, &token).await);
        assert!(!verifier.validate_human_proof(&v1, "").await);
        assert!(!verifier.validate_human_proof(&Address::from("V2"), &token).await);
        assert_eq!(verifier.name(), "internal");
        assert!(verifier.gateway().is_none());
    }

    #[tokio::test]
    async fn gateway_errors_are_failed_checks() {
        let remote = RemoteGateway::new("http://127.0.0.1:9", None).unwrap();
        let verifier = HumanityVerifier::Remote(Arc::new(remote));
        assert!(!verifier.validate_human_proof(&Address::from("V1"), "").await);
        assert_eq!(verifier.name(), "remote");
    }
}
