//! Peer-to-peer propagation for the POHA node.
//!
//! Every message travels on its own TCP connection: dial, write one JSON
//! [`Envelope`], shut down the write half, close. Receivers read to EOF
//! under a deadline and a size cap, then dispatch on the envelope's `type`
//! through an open [`HandlerRegistry`].
//!
//! Peers are learned from bootstrap configuration, explicit connects, and
//! discovery messages. The peer set never shrinks; each send records whether
//! the peer answered.

pub mod broadcast;
pub mod error;
pub mod handlers;
pub mod message;
pub mod peer_network;
pub mod peer_set;

pub use broadcast::BroadcastResult;
pub use error::NetworkError;
pub use handlers::{Handler, HandlerRegistry};
pub use message::{BlockMessage, DiscoveryMessage, Envelope, MessageType, TransactionMessage};
pub use peer_network::{NetworkConfig, PeerNetwork};
pub use peer_set::PeerSet;
