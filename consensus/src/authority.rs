//! Proof-of-Authority engine.
//!
//! Tracks the validator set, this node's registration, and the mining loop.
//! Mining is a state machine `Idle → Mining → Idle`; each run owns a `watch`
//! stop channel so a stop request ends exactly that run, while node shutdown
//! ends every run.
//!
//! While mining, every `block_time` the producer checks that this node is a
//! member and the leader for the next index, re-checks the cached human proof,
//! seals the pending transactions into a block stamped with that proof, signs
//! it, appends it to the local chain, and hands it to the propagation layer.
//! A proof that no longer verifies revokes the registration and ends the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use poha_crypto::{derive_address, sign_block, verify_block_signature};
use poha_ledger::Blockchain;
use poha_types::{Address, Block, KeyPair, Timestamp};
use poha_utils::{ShutdownController, ShutdownSignal};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ConsensusError, HumanityVerifier, ValidatorSet};

pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BLOCK_TRANSACTIONS: usize = 500;

#[derive(Clone, Debug)]
pub struct AuthorityConfig {
    /// Interval between production attempts.
    pub block_time: Duration,
    /// Upper bound on transactions sealed into one block.
    pub max_block_transactions: usize,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            block_time: DEFAULT_BLOCK_TIME,
            max_block_transactions: DEFAULT_MAX_BLOCK_TRANSACTIONS,
        }
    }
}

struct MiningRun {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct AuthorityConsensus {
    keys: KeyPair,
    address: Address,
    validators: RwLock<ValidatorSet>,
    /// Token stamped on produced blocks. Injected by the hybrid layer.
    human_proof: RwLock<Option<String>>,
    /// Checks `human_proof` before each seal. Unset in a bare PoA engine.
    proof_verifier: OnceLock<HumanityVerifier>,
    registered: AtomicBool,
    mining: Mutex<Option<MiningRun>>,
    chain: Arc<dyn Blockchain>,
    /// Produced blocks, drained by the propagation layer.
    produced_tx: mpsc::Sender<Block>,
    shutdown: Arc<ShutdownController>,
    config: AuthorityConfig,
}

impl AuthorityConsensus {
    pub fn new(
        keys: KeyPair,
        validators: ValidatorSet,
        config: AuthorityConfig,
        chain: Arc<dyn Blockchain>,
        produced_tx: mpsc::Sender<Block>,
        shutdown: Arc<ShutdownController>,
    ) -> Arc<Self> {
        let address = derive_address(&keys.public);
        Arc::new(Self {
            keys,
            address,
            validators: RwLock::new(validators),
            human_proof: RwLock::new(None),
            proof_verifier: OnceLock::new(),
            registered: AtomicBool::new(false),
            mining: Mutex::new(None),
            chain,
            produced_tx,
            shutdown,
            config,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn validators(&self) -> ValidatorSet {
        self.validators.read().await.clone()
    }

    pub async fn set_human_proof(&self, token: String) {
        *self.human_proof.write().await = Some(token);
    }

    pub async fn human_proof(&self) -> Option<String> {
        self.human_proof.read().await.clone()
    }

    /// Check this node's own proof with `verifier` before every block it
    /// seals. Only the first binding takes effect.
    pub fn bind_proof_verifier(&self, verifier: HumanityVerifier) {
        if self.proof_verifier.set(verifier).is_err() {
            warn!(address = %self.address, "proof verifier already bound");
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Drop the cached proof and the registration.
    pub async fn revoke_registration(&self) {
        *self.human_proof.write().await = None;
        if self.registered.swap(false, Ordering::SeqCst) {
            info!(address = %self.address, "validator registration revoked");
        }
    }

    /// Succeeds iff this node's address is in the validator set.
    pub async fn register_as_validator(&self) -> Result<(), ConsensusError> {
        if !self.validators.read().await.contains(&self.address) {
            return Err(ConsensusError::NotAValidator(self.address.to_string()));
        }
        if !self.registered.swap(true, Ordering::SeqCst) {
            info!(address = %self.address, "registered as validator");
        }
        Ok(())
    }

    /// Replace the validator set.
    pub async fn update_validator_list(&self, addresses: Vec<Address>) {
        let set = ValidatorSet::new(addresses);
        let member = set.contains(&self.address);
        let count = set.len();
        *self.validators.write().await = set;
        info!(validators = count, member, "validator set updated");
    }

    /// Start the producer loop. A no-op while already mining.
    pub async fn start_mining(self: &Arc<Self>) -> Result<(), ConsensusError> {
        if !self.is_registered() || !self.validators.read().await.contains(&self.address) {
            return Err(ConsensusError::NotAValidator(self.address.to_string()));
        }

        let mut mining = self.mining.lock().await;
        if mining.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            return Ok(());
        }

        let (stop, stop_rx) = watch::channel(false);
        let engine = Arc::clone(self);
        let shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move { engine.run_producer(stop_rx, shutdown_rx).await });
        *mining = Some(MiningRun { stop, handle });

        info!(
            address = %self.address,
            block_time_ms = self.config.block_time.as_millis() as u64,
            "mining started"
        );
        Ok(())
    }

    /// Stop the producer loop and wait for it to exit. A no-op while idle.
    pub async fn stop_mining(&self) {
        let run = self.mining.lock().await.take();
        if let Some(run) = run {
            let _ = run.stop.send(true);
            if let Err(e) = run.handle.await {
                warn!("mining task ended abnormally: {e}");
            }
            info!(address = %self.address, "mining stopped");
        }
    }

    pub async fn is_mining(&self) -> bool {
        self.mining
            .lock()
            .await
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Authority checks for a block received from a peer.
    pub async fn verify_block(&self, block: &Block) -> Result<(), ConsensusError> {
        if !self.validators.read().await.contains(&block.validator) {
            return Err(ConsensusError::UnauthorizedValidator(block.validator.to_string()));
        }

        let head = self.chain.head().await;
        if block.index != head.index + 1 {
            return Err(ConsensusError::InvalidBlock {
                reason: format!("index {} does not follow head {}", block.index, head.index),
            });
        }
        if block.prev_hash != head.hash {
            return Err(ConsensusError::PrevHashMismatch {
                expected: head.hash.to_string(),
                got: block.prev_hash.to_string(),
            });
        }
        if !block.has_valid_hash() {
            return Err(ConsensusError::InvalidBlock {
                reason: "hash does not match contents".into(),
            });
        }
        if !block.has_valid_transactions() {
            return Err(ConsensusError::InvalidBlock {
                reason: "transaction does not match its id".into(),
            });
        }
        if !verify_block_signature(block) {
            return Err(ConsensusError::InvalidSignature(block.validator.to_string()));
        }
        Ok(())
    }

    /// One production attempt. Returns the sealed block, or `None` when this
    /// tick is skipped (not a member, not our turn, no proof token).
    ///
    /// Fails with `InvalidHumanProof` when the cached proof no longer
    /// verifies; the registration is revoked first.
    pub async fn produce_block(&self) -> Result<Option<Block>, ConsensusError> {
        let head = self.chain.head().await;
        let next = head.index + 1;

        {
            let validators = self.validators.read().await;
            if !validators.contains(&self.address) {
                debug!(index = next, "skipping tick: not in validator set");
                return Ok(None);
            }
            if validators.leader_for(next) != Some(&self.address) {
                debug!(index = next, "skipping tick: not our turn");
                return Ok(None);
            }
        }

        let Some(proof) = self.human_proof().await else {
            debug!(index = next, "skipping tick: no human proof token");
            return Ok(None);
        };
        if let Some(verifier) = self.proof_verifier.get() {
            if !verifier.validate_human_proof(&self.address, &proof).await {
                warn!(index = next, verifier = verifier.name(), "human proof no longer valid");
                self.revoke_registration().await;
                return Err(ConsensusError::InvalidHumanProof(self.address.to_string()));
            }
        }

        let transactions = self
            .chain
            .pending_transactions(self.config.max_block_transactions)
            .await;
        let block = Block::unsigned(
            next,
            head.hash,
            Timestamp::now(),
            transactions,
            self.address.clone(),
            proof,
        );
        let block = sign_block(block, &self.keys.private);

        self.chain.add_block(block.clone()).await?;
        info!(
            index = block.index,
            hash = %block.hash,
            txs = block.transactions.len(),
            "block produced"
        );

        if self.produced_tx.send(block.clone()).await.is_err() {
            warn!(index = block.index, "block propagation channel closed");
        }
        Ok(Some(block))
    }

    async fn run_producer(
        self: Arc<Self>,
        mut stop_rx: watch::Receiver<bool>,
        mut shutdown_rx: ShutdownSignal,
    ) {
        let period = self.config.block_time;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("mining task shutting down");
                    break;
                }
                _ = stop_rx.changed() => break,
                _ = interval.tick() => match self.produce_block().await {
                    Ok(_) => {}
                    Err(ConsensusError::InvalidHumanProof(_)) => {
                        warn!(address = %self.address, "human proof lapsed, mining stopped");
                        break;
                    }
                    Err(e) => warn!("block production failed: {e}"),
                },
            }
        }
    }
}
