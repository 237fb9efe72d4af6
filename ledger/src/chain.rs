//! The `Blockchain` collaborator interface.

use async_trait::async_trait;
use poha_types::{Address, Block, BlockHash, Transaction};

use crate::LedgerError;

/// Index and hash of the current chain tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainHead {
    pub index: u64,
    pub hash: BlockHash,
}

impl ChainHead {
    pub fn of(block: &Block) -> Self {
        Self {
            index: block.index,
            hash: block.hash,
        }
    }
}

/// Ledger operations consumed by consensus and the propagation layer.
///
/// Implementations must be safe to call concurrently from the accept loop,
/// the block producer, and foreground callers.
#[async_trait]
pub trait Blockchain: Send + Sync {
    /// Append a block on top of the current head.
    async fn add_block(&self, block: Block) -> Result<(), LedgerError>;

    /// Queue a transaction for inclusion in a future block.
    async fn add_transaction(&self, tx: Transaction) -> Result<(), LedgerError>;

    /// The humanity proof `address` most recently stamped on a block, if any.
    async fn human_proof(&self, address: &Address) -> Option<String>;

    /// The current chain tip.
    async fn head(&self) -> ChainHead;

    /// Up to `max` queued transactions, oldest first, without removing them.
    async fn pending_transactions(&self, max: usize) -> Vec<Transaction>;

    /// Index of the chain tip.
    async fn height(&self) -> u64 {
        self.head().await.index
    }
}
