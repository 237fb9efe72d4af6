//! In-memory linear chain.
//!
//! One chain, no forks: a block is accepted only if it extends the current
//! head exactly. Transactions wait in an insertion-ordered pool until a block
//! that carries them is appended.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use poha_types::{Address, Block, BlockHash, Transaction, TxHash};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{Blockchain, ChainHead, LedgerError};

struct ChainState {
    blocks: Vec<Block>,
    by_hash: HashMap<BlockHash, u64>,
    pending: VecDeque<Transaction>,
    pending_ids: HashSet<TxHash>,
    included: HashSet<TxHash>,
    proofs: HashMap<Address, String>,
}

impl ChainState {
    fn head(&self) -> &Block {
        // blocks always holds at least the genesis block
        &self.blocks[self.blocks.len() - 1]
    }
}

pub struct MemoryLedger {
    state: RwLock<ChainState>,
}

impl MemoryLedger {
    /// A ledger holding only the genesis block.
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let mut by_hash = HashMap::new();
        by_hash.insert(genesis.hash, 0);
        Self {
            state: RwLock::new(ChainState {
                blocks: vec![genesis],
                by_hash,
                pending: VecDeque::new(),
                pending_ids: HashSet::new(),
                included: HashSet::new(),
                proofs: HashMap::new(),
            }),
        }
    }

    pub async fn block(&self, index: u64) -> Option<Block> {
        let state = self.state.read().await;
        usize::try_from(index)
            .ok()
            .and_then(|i| state.blocks.get(i))
            .cloned()
    }

    pub async fn block_by_hash(&self, hash: &BlockHash) -> Option<Block> {
        let state = self.state.read().await;
        let index = *state.by_hash.get(hash)?;
        state.blocks.get(index as usize).cloned()
    }

    pub async fn contains_transaction(&self, id: &TxHash) -> bool {
        let state = self.state.read().await;
        state.pending_ids.contains(id) || state.included.contains(id)
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Blockchain for MemoryLedger {
    async fn add_block(&self, block: Block) -> Result<(), LedgerError> {
        if !block.has_valid_hash() {
            return Err(LedgerError::InvalidBlock {
                reason: "hash does not match contents".into(),
            });
        }
        if !block.has_valid_transactions() {
            return Err(LedgerError::InvalidBlock {
                reason: "transaction does not match its id".into(),
            });
        }

        let mut state = self.state.write().await;
        if state.by_hash.contains_key(&block.hash) {
            return Err(LedgerError::DuplicateBlock(block.hash.to_string()));
        }

        let head = state.head();
        let expected = head.index + 1;
        if block.index != expected {
            return Err(LedgerError::BlockGap {
                expected,
                got: block.index,
            });
        }
        if block.prev_hash != head.hash {
            return Err(LedgerError::NotOnHead {
                head: head.hash.to_string(),
                prev_hash: block.prev_hash.to_string(),
            });
        }

        let included: HashSet<TxHash> = block.transactions.iter().map(|tx| tx.id).collect();
        if !included.is_empty() {
            state.pending.retain(|tx| !included.contains(&tx.id));
            for id in &included {
                state.pending_ids.remove(id);
            }
            state.included.extend(included);
        }

        if !block.human_proof.is_empty() {
            state
                .proofs
                .insert(block.validator.clone(), block.human_proof.clone());
        }

        debug!(index = block.index, hash = %block.hash, validator = %block.validator, "block appended");
        state.by_hash.insert(block.hash, block.index);
        state.blocks.push(block);
        Ok(())
    }

    async fn add_transaction(&self, tx: Transaction) -> Result<(), LedgerError> {
        if !tx.has_valid_id() {
            return Err(LedgerError::InvalidTransaction {
                reason: "id does not match contents".into(),
            });
        }

        let mut state = self.state.write().await;
        if state.pending_ids.contains(&tx.id) || state.included.contains(&tx.id) {
            return Err(LedgerError::DuplicateTransaction(tx.id.to_string()));
        }
        state.pending_ids.insert(tx.id);
        state.pending.push_back(tx);
        Ok(())
    }

    async fn human_proof(&self, address: &Address) -> Option<String> {
        self.state.read().await.proofs.get(address).cloned()
    }

    async fn head(&self) -> ChainHead {
        ChainHead::of(self.state.read().await.head())
    }

    async fn pending_transactions(&self, max: usize) -> Vec<Transaction> {
        let state = self.state.read().await;
        state.pending.iter().take(max).cloned().collect()
    }
}
