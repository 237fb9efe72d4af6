//! Human verification records.

use poha_types::{Address, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
}

/// What a verifier knows about one presented token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Verified,
    /// The latest token for the address, not yet completed.
    Pending,
    /// Superseded or expired.
    Invalid,
}

/// One address's verification. A registry holds at most one per address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanVerificationRecord {
    pub address: Address,
    pub token: String,
    pub status: VerificationStatus,
    pub issued_at: Timestamp,
    pub verified_at: Option<Timestamp>,
    pub expires_at: Timestamp,
}

impl HumanVerificationRecord {
    pub fn pending(address: Address, token: String, issued_at: Timestamp, ttl_secs: u64) -> Self {
        Self {
            address,
            token,
            status: VerificationStatus::Pending,
            issued_at,
            verified_at: None,
            expires_at: issued_at.plus_secs(ttl_secs),
        }
    }

    /// Whether the TTL has run out at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Verified and still inside its TTL.
    pub fn is_current(&self, now: Timestamp) -> bool {
        self.status == VerificationStatus::Verified && !self.is_expired(now)
    }

    pub fn token_status(&self, token: &str, now: Timestamp) -> TokenStatus {
        if self.token != token || self.is_expired(now) {
            TokenStatus::Invalid
        } else if self.status == VerificationStatus::Verified {
            TokenStatus::Verified
        } else {
            TokenStatus::Pending
        }
    }
}
