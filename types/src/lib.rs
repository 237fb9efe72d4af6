//! Fundamental types for the POHA node.
//!
//! This crate defines the data shared by every other crate in the workspace:
//! addresses, hashes, timestamps, keys, and the immutable `Block` and
//! `Transaction` records that consensus produces and the network carries.

pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod keys;
pub mod time;
pub mod transaction;

pub use address::Address;
pub use block::{Block, BlockHash};
pub use error::TypesError;
pub use hash::TxHash;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use time::Timestamp;
pub use transaction::Transaction;
