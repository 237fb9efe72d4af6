//! Address derivation from public keys.

use poha_types::{Address, PublicKey};

/// Derive the node address for a public key (`poha_` + hex public key).
pub fn derive_address(public_key: &PublicKey) -> Address {
    Address::from_public_key(public_key)
}
