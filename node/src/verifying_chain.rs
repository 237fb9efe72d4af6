//! The chain as seen by the peer network.
//!
//! Blocks arriving from peers pass hybrid verification before they reach the
//! ledger. Locally produced blocks bypass this and go straight to the ledger.

use std::sync::Arc;

use async_trait::async_trait;
use poha_consensus::HybridConsensus;
use poha_ledger::{Blockchain, ChainHead, LedgerError, MemoryLedger};
use poha_types::{Address, Block, Transaction};
use tracing::{debug, warn};

use crate::NodeMetrics;

pub struct VerifyingChain {
    ledger: Arc<MemoryLedger>,
    consensus: Arc<HybridConsensus>,
    metrics: Arc<NodeMetrics>,
}

impl VerifyingChain {
    pub fn new(
        ledger: Arc<MemoryLedger>,
        consensus: Arc<HybridConsensus>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            ledger,
            consensus,
            metrics,
        }
    }
}

#[async_trait]
impl Blockchain for VerifyingChain {
    async fn add_block(&self, block: Block) -> Result<(), LedgerError> {
        if let Err(e) = self.consensus.verify_block(&block).await {
            self.metrics.blocks_rejected.inc();
            warn!(
                index = block.index,
                validator = %block.validator,
                "peer block rejected: {e}"
            );
            return Err(LedgerError::Rejected(e.to_string()));
        }

        let index = block.index;
        match self.ledger.add_block(block).await {
            Ok(()) => {
                self.metrics.blocks_accepted.inc();
                self.metrics.chain_height.set(index as i64);
                debug!(index, "peer block accepted");
                Ok(())
            }
            Err(e) => {
                self.metrics.blocks_rejected.inc();
                Err(e)
            }
        }
    }

    async fn add_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.ledger.add_transaction(transaction).await?;
        self.metrics.transactions_received.inc();
        Ok(())
    }

    async fn human_proof(&self, address: &Address) -> Option<String> {
        self.ledger.human_proof(address).await
    }

    async fn head(&self) -> ChainHead {
        self.ledger.head().await
    }

    async fn pending_transactions(&self, max: usize) -> Vec<Transaction> {
        self.ledger.pending_transactions(max).await
    }
}
