//! Ledger collaborator for the POHA node.
//!
//! Consensus and networking only ever see the [`Blockchain`] trait: append a
//! block, queue a transaction, look up the humanity proof a validator last
//! stamped on-chain. Storage layout and transaction execution are out of
//! scope; [`MemoryLedger`] keeps a single linear chain in memory.

pub mod chain;
pub mod error;
pub mod memory;

pub use chain::{Blockchain, ChainHead};
pub use error::LedgerError;
pub use memory::MemoryLedger;
