//! Cryptographic primitives for the POHA node.
//!
//! - **Ed25519** for block signing and signature verification
//! - **Blake2b-256** for humanity proof tokens and general hashing
//! - Address derivation with the `poha_` prefix

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::derive_address;
pub use hash::{blake2b_256, blake2b_256_multi, hex_digest};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_block, sign_message, verify_block_signature, verify_signature};
