//! POHA node: orchestrates the ledger, humanity verification, hybrid
//! consensus and the peer network.
//!
//! The node owns:
//! - an in-memory ledger, fed by the local producer and, through
//!   [`VerifyingChain`], by peers
//! - the humanity backend (internal registry, local simulator or remote
//!   service)
//! - hybrid PoA + PoH consensus
//! - the TCP peer network and the produced-block propagation task

pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod verifying_chain;

pub use config::{NodeConfig, VerifierMode};
pub use error::NodeError;
pub use metrics::NodeMetrics;
pub use node::PohaNode;
pub use verifying_chain::VerifyingChain;
