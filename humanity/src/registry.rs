//! In-node registry of human verifications.
//!
//! Records live in a fixed number of lock shards keyed by a hash of the
//! address, so registrations for different validators never queue behind
//! one another. Every read-then-write on an address (completion, sweep)
//! happens under that address's shard write lock.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use poha_crypto::hex_digest;
use poha_types::{Address, Timestamp};
use poha_utils::ShutdownController;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};

use crate::record::{HumanVerificationRecord, TokenStatus, VerificationStatus};
use crate::HumanityError;

const SHARD_COUNT: usize = 16;

/// Verification lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// How often expired records are swept.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug)]
pub struct RegistryConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

type Records = HashMap<Address, HumanVerificationRecord>;
type Shard = RwLock<Records>;

pub struct HumanityRegistry {
    shards: Vec<Shard>,
    ttl_secs: u64,
    sweep_interval: Duration,
}

impl HumanityRegistry {
    /// A registry without a background sweep. Expired records stay until
    /// [`sweep_expired`](Self::sweep_expired) is called.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
            ttl_secs: config.ttl.as_secs(),
            sweep_interval: config.sweep_interval,
        }
    }

    /// Build a registry and spawn its sweep task, which runs every
    /// `sweep_interval` until `shutdown` fires.
    pub fn start(config: RegistryConfig, shutdown: &ShutdownController) -> Arc<Self> {
        let registry = Arc::new(Self::new(config));
        let sweeper = Arc::clone(&registry);
        let mut shutdown_rx = shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.sweep_interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("humanity sweep task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = sweeper.sweep_expired(Timestamp::now());
                        if removed > 0 {
                            info!(removed, "swept expired human verifications");
                        }
                    }
                }
            }
        });

        registry
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Open a Pending verification for `address` and return its fresh token.
    /// Any earlier record for the address is replaced.
    pub fn register_verification(&self, address: &Address) -> String {
        self.register_verification_at(address, Timestamp::now())
    }

    pub fn register_verification_at(&self, address: &Address, now: Timestamp) -> String {
        let token = fresh_token(address);
        let record =
            HumanVerificationRecord::pending(address.clone(), token.clone(), now, self.ttl_secs);
        self.write_shard(address).insert(address.clone(), record);
        debug!(%address, "human verification registered");
        token
    }

    /// Mark the verification for `address` as completed.
    pub fn complete_verification(
        &self,
        address: &Address,
        token: &str,
    ) -> Result<(), HumanityError> {
        self.complete_verification_at(address, token, Timestamp::now())
    }

    pub fn complete_verification_at(
        &self,
        address: &Address,
        token: &str,
        now: Timestamp,
    ) -> Result<(), HumanityError> {
        let mut shard = self.write_shard(address);
        let record = shard
            .get_mut(address)
            .ok_or_else(|| HumanityError::NotFound(address.to_string()))?;
        if record.token != token {
            return Err(HumanityError::TokenMismatch(address.to_string()));
        }
        if record.status != VerificationStatus::Verified {
            record.status = VerificationStatus::Verified;
            record.verified_at = Some(now);
            info!(%address, "human verification completed");
        }
        Ok(())
    }

    pub fn is_human_verified(&self, address: &Address) -> bool {
        self.is_human_verified_at(address, Timestamp::now())
    }

    pub fn is_human_verified_at(&self, address: &Address, now: Timestamp) -> bool {
        self.read_shard(address)
            .get(address)
            .is_some_and(|record| record.is_current(now))
    }

    /// The token of a Verified, unexpired record.
    pub fn get_proof_token(&self, address: &Address) -> Result<String, HumanityError> {
        self.get_proof_token_at(address, Timestamp::now())
    }

    pub fn get_proof_token_at(
        &self,
        address: &Address,
        now: Timestamp,
    ) -> Result<String, HumanityError> {
        self.read_shard(address)
            .get(address)
            .filter(|record| record.is_current(now))
            .map(|record| record.token.clone())
            .ok_or_else(|| HumanityError::NotVerified(address.to_string()))
    }

    /// Whether `proof` is exactly the token of a current verification for `address`.
    pub fn validate_proof(&self, address: &Address, proof: &str) -> bool {
        self.validate_proof_at(address, proof, Timestamp::now())
    }

    pub fn validate_proof_at(&self, address: &Address, proof: &str, now: Timestamp) -> bool {
        !proof.is_empty()
            && self
                .read_shard(address)
                .get(address)
                .is_some_and(|record| record.is_current(now) && record.token == proof)
    }

    /// How `token` stands against the record for `address`; `None` when the
    /// address has no record.
    pub fn token_status(&self, address: &Address, token: &str) -> Option<TokenStatus> {
        self.token_status_at(address, token, Timestamp::now())
    }

    pub fn token_status_at(
        &self,
        address: &Address,
        token: &str,
        now: Timestamp,
    ) -> Option<TokenStatus> {
        self.read_shard(address)
            .get(address)
            .map(|record| record.token_status(token, now))
    }

    pub fn status(&self, address: &Address) -> Option<VerificationStatus> {
        self.read_shard(address).get(address).map(|record| record.status)
    }

    pub fn record(&self, address: &Address) -> Option<HumanVerificationRecord> {
        self.read_shard(address).get(address).cloned()
    }

    /// Drop every record whose TTL has run out at `now`, verified or not.
    pub fn sweep_expired(&self, now: Timestamp) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut records = shard.write().unwrap_or_else(PoisonError::into_inner);
            let before = records.len();
            records.retain(|_, record| !record.is_expired(now));
            removed += before - records.len();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_for(&self, address: &Address) -> &Shard {
        &self.shards[shard_index(address)]
    }

    fn read_shard(&self, address: &Address) -> RwLockReadGuard<'_, Records> {
        self.shard_for(address)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_shard(&self, address: &Address) -> RwLockWriteGuard<'_, Records> {
        self.shard_for(address)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// FNV-1a over the address bytes.
fn shard_index(address: &Address) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in address.as_str().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % SHARD_COUNT as u64) as usize
}

/// hex(Blake2b-256(address ‖ nanos ‖ salt)).
fn fresh_token(address: &Address) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    hex_digest(&[address.as_str().as_bytes(), &nanos.to_be_bytes(), &salt])
}
