//! Hybrid PoA + PoH consensus.
//!
//! Registration moves `Unregistered → Registering → Validator`. Reaching
//! Validator needs both a verified human-proof token and membership in the
//! validator set; failing either sends the node back to Unregistered.
//! Only a Validator may start mining. A proof that lapses while mining
//! revokes the authority registration, which also ends the Validator state.

use std::sync::Arc;

use poha_humanity::{HumanityGateway, TokenStatus};
use poha_ledger::Blockchain;
use poha_types::{Address, Block};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{AuthorityConsensus, ConsensusError, HumanityVerifier, ValidatorSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Validator,
}

pub struct HybridConsensus {
    authority: Arc<AuthorityConsensus>,
    verifier: HumanityVerifier,
    chain: Arc<dyn Blockchain>,
    state: RwLock<RegistrationState>,
    /// Token from an external gateway, reused across registrations. The lock
    /// also serializes concurrent registration attempts.
    external_token: Mutex<Option<String>>,
}

impl HybridConsensus {
    pub fn new(
        authority: Arc<AuthorityConsensus>,
        verifier: HumanityVerifier,
        chain: Arc<dyn Blockchain>,
    ) -> Self {
        authority.bind_proof_verifier(verifier.clone());
        Self {
            authority,
            verifier,
            chain,
            state: RwLock::new(RegistrationState::Unregistered),
            external_token: Mutex::new(None),
        }
    }

    pub fn authority(&self) -> &Arc<AuthorityConsensus> {
        &self.authority
    }

    pub fn verifier(&self) -> &HumanityVerifier {
        &self.verifier
    }

    pub fn address(&self) -> &Address {
        self.authority.address()
    }

    pub async fn state(&self) -> RegistrationState {
        let mut state = self.state.write().await;
        if *state == RegistrationState::Validator && !self.authority.is_registered() {
            *state = RegistrationState::Unregistered;
        }
        *state
    }

    /// Resolve a verified human-proof token, hand it to the authority engine,
    /// and register there.
    pub async fn register_as_validator(&self) -> Result<(), ConsensusError> {
        let mut external_token = self.external_token.lock().await;
        self.set_state(RegistrationState::Registering).await;

        let token = match self.resolve_proof(&mut external_token).await {
            Ok(token) => token,
            Err(e) => {
                self.demote().await;
                return Err(e);
            }
        };

        self.authority.set_human_proof(token).await;
        if let Err(e) = self.authority.register_as_validator().await {
            self.demote().await;
            return Err(e);
        }

        self.set_state(RegistrationState::Validator).await;
        info!(
            address = %self.address(),
            verifier = self.verifier.name(),
            "validator registration complete"
        );
        Ok(())
    }

    /// Start mining. Registration runs on every call, so the proof is
    /// re-resolved even for a node that is already a Validator.
    pub async fn start_mining(&self) -> Result<(), ConsensusError> {
        if let Err(e) = self.register_as_validator().await {
            warn!(address = %self.address(), "cannot mine: {e}");
            return Err(ConsensusError::NotAValidator(self.address().to_string()));
        }
        self.authority.start_mining().await
    }

    pub async fn stop_mining(&self) {
        self.authority.stop_mining().await;
    }

    pub async fn is_mining(&self) -> bool {
        self.authority.is_mining().await
    }

    pub async fn update_validator_list(&self, addresses: Vec<Address>) {
        self.authority.update_validator_list(addresses).await;
    }

    pub async fn validators(&self) -> ValidatorSet {
        self.authority.validators().await
    }

    /// Authority checks first, then the block's human proof.
    pub async fn verify_block(&self, block: &Block) -> Result<(), ConsensusError> {
        self.authority.verify_block(block).await?;
        if !self
            .verifier
            .validate_human_proof(&block.validator, &block.human_proof)
            .await
        {
            return Err(ConsensusError::InvalidHumanProof(block.validator.to_string()));
        }
        Ok(())
    }

    async fn set_state(&self, next: RegistrationState) {
        *self.state.write().await = next;
    }

    /// Back to Unregistered: no mining, no cached proof in the engine.
    async fn demote(&self) {
        self.authority.stop_mining().await;
        self.authority.revoke_registration().await;
        self.set_state(RegistrationState::Unregistered).await;
    }

    async fn resolve_proof(
        &self,
        external_token: &mut Option<String>,
    ) -> Result<String, ConsensusError> {
        let address = self.address().clone();
        match &self.verifier {
            HumanityVerifier::Internal(registry) => registry.get_proof_token(&address).map_err(|_| {
                ConsensusError::HumanVerificationRequired {
                    address: address.to_string(),
                    url: None,
                }
            }),
            HumanityVerifier::Simulator(gw) => {
                self.resolve_external(gw.as_ref(), &address, external_token).await
            }
            HumanityVerifier::Remote(gw) => {
                self.resolve_external(gw.as_ref(), &address, external_token).await
            }
        }
    }

    /// Cached token, then the proof last stamped on-chain, then a fresh
    /// verification. A token still awaiting its human keeps its URL; a new
    /// verification starts only once every known token is invalid or unknown
    /// to the gateway.
    async fn resolve_external(
        &self,
        gateway: &dyn HumanityGateway,
        address: &Address,
        external_token: &mut Option<String>,
    ) -> Result<String, ConsensusError> {
        let mut candidates: Vec<String> = external_token.iter().cloned().collect();
        if let Some(on_chain) = self.chain.human_proof(address).await {
            if !candidates.contains(&on_chain) {
                candidates.push(on_chain);
            }
        }

        for token in candidates {
            match gateway.token_status(address, &token).await {
                Ok(TokenStatus::Verified) => {
                    *external_token = Some(token.clone());
                    return Ok(token);
                }
                Ok(TokenStatus::Pending) => {
                    debug!(%address, gateway = gateway.name(), "human verification still pending");
                    let url = gateway.verification_url(address, &token);
                    *external_token = Some(token);
                    return Err(ConsensusError::HumanVerificationRequired {
                        address: address.to_string(),
                        url: Some(url),
                    });
                }
                Ok(TokenStatus::Invalid) => {
                    debug!(%address, gateway = gateway.name(), "known proof token no longer valid");
                }
                Err(e) => {
                    debug!(%address, gateway = gateway.name(), "humanity check failed: {e}");
                }
            }
        }

        let token = gateway.initiate_verification(address).await?;
        debug!(%address, gateway = gateway.name(), "human verification initiated");
        *external_token = Some(token.clone());
        if gateway.verify_humanity(address, &token).await.unwrap_or(false) {
            return Ok(token);
        }

        Err(ConsensusError::HumanVerificationRequired {
            address: address.to_string(),
            url: Some(gateway.verification_url(address, &token)),
        })
    }
}
