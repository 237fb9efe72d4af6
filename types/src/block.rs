//! Blocks and block hashes.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{Address, Signature, Timestamp, Transaction, TypesError};

type Blake2b256 = Blake2b<U32>;

/// A 32-byte block hash, hex encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({}\u{2026})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for BlockHash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::hash::decode_fixed::<32>(s).map(Self)
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A block in the authority chain.
///
/// Immutable once sealed. Validity is not stored: it is a function of the
/// validator set and the validator's humanity proof at verification time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    pub validator: Address,
    #[serde(default)]
    pub human_proof: String,
    #[serde(default)]
    pub signature: Signature,
}

/// Validator recorded on the genesis block.
pub const GENESIS_VALIDATOR: &str = "genesis";

impl Block {
    /// Assemble an unsigned block and compute its hash.
    pub fn unsigned(
        index: u64,
        prev_hash: BlockHash,
        timestamp: Timestamp,
        transactions: Vec<Transaction>,
        validator: Address,
        human_proof: String,
    ) -> Self {
        let mut block = Self {
            index,
            hash: BlockHash::ZERO,
            prev_hash,
            timestamp,
            transactions,
            validator,
            human_proof,
            signature: Signature::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// The fixed genesis block every ledger starts from.
    pub fn genesis() -> Self {
        Self::unsigned(
            0,
            BlockHash::ZERO,
            Timestamp::EPOCH,
            Vec::new(),
            Address::from(GENESIS_VALIDATOR),
            String::new(),
        )
    }

    /// Canonical bytes covered by the hash: every field except `hash` and `signature`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + self.transactions.len() * 32);
        buf.extend_from_slice(&self.index.to_be_bytes());
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(&self.timestamp.as_secs().to_be_bytes());
        buf.extend_from_slice(&(self.transactions.len() as u32).to_be_bytes());
        for tx in &self.transactions {
            buf.extend_from_slice(tx.id.as_bytes());
        }
        put_field(&mut buf, self.validator.as_str().as_bytes());
        put_field(&mut buf, self.human_proof.as_bytes());
        buf
    }

    pub fn compute_hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256(&self.signing_bytes()))
    }

    /// Whether the stored hash matches the block contents.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Whether every carried transaction still matches its id. The block
    /// hash covers only the ids, so both checks are needed.
    pub fn has_valid_transactions(&self) -> bool {
        self.transactions.iter().all(Transaction::has_valid_id)
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }
}

/// Append a length-prefixed field to a canonical encoding buffer.
pub(crate) fn put_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

// poha-crypto depends on this crate, so block and transaction ids hash here.
pub(crate) fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
