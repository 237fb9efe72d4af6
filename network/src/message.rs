//! Wire format.
//!
//! ```json
//! {"type": "block", "from": "10.0.0.1:7600", "payload": {"block": {...}}}
//! ```

use poha_types::{Block, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::NetworkError;

/// Built-in message types.
pub struct MessageType;

impl MessageType {
    pub const BLOCK: &'static str = "block";
    pub const TRANSACTION: &'static str = "transaction";
    pub const DISCOVERY: &'static str = "discovery";
}

/// One message on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    /// The sender's advertised network address.
    pub from: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new<T: Serialize>(
        msg_type: impl Into<String>,
        from: impl Into<String>,
        payload: &T,
    ) -> Result<Self, NetworkError> {
        Ok(Self {
            msg_type: msg_type.into(),
            from: from.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        Ok(T::deserialize(&self.payload)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetworkError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockMessage {
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub transaction: Transaction,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    pub peer_addresses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_type_key() {
        let env = Envelope::new(
            MessageType::DISCOVERY,
            "127.0.0.1:7600",
            &DiscoveryMessage {
                peer_addresses: vec!["127.0.0.1:7601".into()],
            },
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&env.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "discovery");
        assert_eq!(json["from"], "127.0.0.1:7600");
        assert_eq!(json["payload"]["peer_addresses"][0], "127.0.0.1:7601");
    }

    #[test]
    fn block_payload_survives_the_wire() {
        let block = Block::genesis();
        let env = Envelope::new(MessageType::BLOCK, "a", &BlockMessage { block: block.clone() }).unwrap();
        let back = Envelope::from_bytes(&env.to_bytes().unwrap()).unwrap();
        let msg: BlockMessage = back.payload_as().unwrap();
        assert_eq!(msg.block, block);
        assert!(msg.block.has_valid_hash());
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(
            Envelope::from_bytes(b"not json"),
            Err(NetworkError::Codec(_))
        ));
        let env = Envelope::new("block", "a", &serde_json::json!({"nope": 1})).unwrap();
        assert!(env.payload_as::<BlockMessage>().is_err());
    }
}
