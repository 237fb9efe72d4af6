//! Node / account address type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::PublicKey;
use crate::TypesError;

/// An account address.
///
/// Addresses derived from a key are `poha_` followed by the lowercase hex of
/// the 32-byte Ed25519 public key, so the key can be recovered for signature
/// checks. Any other string is still a valid (opaque) address; it just cannot
/// sign anything.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// The prefix carried by every key-derived address.
    pub const PREFIX: &'static str = "poha_";

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Derive the address that corresponds to `public_key`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(format!("{}{}", Self::PREFIX, hex::encode(public_key.as_bytes())))
    }

    /// Recover the public key embedded in a key-derived address.
    pub fn public_key(&self) -> Result<PublicKey, TypesError> {
        let encoded = self
            .0
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| TypesError::NotKeyAddress(self.0.clone()))?;
        crate::hash::decode_fixed::<32>(encoded).map(PublicKey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
