//! Value-transfer transactions.
//!
//! Transactions are produced outside the node (wallets, RPC clients) and
//! consumed by the block producer. They are never mutated after creation;
//! execution semantics are left to the ledger.

use serde::{Deserialize, Serialize};

use crate::block::{blake2b_256, put_field};
use crate::{Address, Signature, Timestamp, TxHash};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxHash,
    pub from: Address,
    pub to: Address,
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub signature: Signature,
}

impl Transaction {
    /// Build an unsigned transaction and compute its id.
    pub fn new(
        from: Address,
        to: Address,
        value: u64,
        payload: Option<String>,
        timestamp: Timestamp,
    ) -> Self {
        let mut tx = Self {
            id: TxHash::ZERO,
            from,
            to,
            value,
            payload,
            timestamp,
            signature: Signature::ZERO,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Canonical bytes covered by the id and the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        put_field(&mut buf, self.from.as_str().as_bytes());
        put_field(&mut buf, self.to.as_str().as_bytes());
        buf.extend_from_slice(&self.value.to_be_bytes());
        match &self.payload {
            Some(p) => {
                buf.push(1);
                put_field(&mut buf, p.as_bytes());
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&self.timestamp.as_secs().to_be_bytes());
        buf
    }

    pub fn compute_id(&self) -> TxHash {
        TxHash::new(blake2b_256(&self.signing_bytes()))
    }

    /// Whether the stored id matches the transaction contents.
    pub fn has_valid_id(&self) -> bool {
        self.id == self.compute_id()
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::new(
            Address::from("alice"),
            Address::from("bob"),
            42,
            Some("memo".into()),
            Timestamp::new(1_700_000_000),
        )
    }

    #[test]
    fn id_covers_every_field() {
        let tx = sample();
        assert!(tx.has_valid_id());

        let mut tampered = tx.clone();
        tampered.value = 43;
        assert!(!tampered.has_valid_id());

        let mut no_payload = tx.clone();
        no_payload.payload = None;
        assert_ne!(no_payload.compute_id(), tx.id);
    }

    #[test]
    fn signature_is_not_part_of_id() {
        let tx = sample();
        let signed = tx.clone().with_signature(Signature([9u8; 64]));
        assert_eq!(signed.compute_id(), tx.id);
    }

    #[test]
    fn missing_payload_is_omitted_from_json() {
        let tx = Transaction::new("a".into(), "b".into(), 1, None, Timestamp::new(1));
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("payload").is_none());
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
