//! The POHA node: wires the ledger, humanity verification, hybrid consensus
//! and the peer network together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use poha_consensus::{
    AuthorityConsensus, ConsensusError, HumanityVerifier, HybridConsensus, ValidatorSet,
};
use poha_humanity::{HumanityError, HumanityRegistry, RemoteGateway, SimulatorGateway};
use poha_ledger::{Blockchain, MemoryLedger};
use poha_network::{BroadcastResult, PeerNetwork};
use poha_types::{Address, Block, Transaction};
use poha_utils::{ShutdownController, ShutdownSignal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{check_internal_validators, NodeConfig, VerifierMode};
use crate::error::NodeError;
use crate::metrics::{self, NodeMetrics};
use crate::verifying_chain::VerifyingChain;

/// Capacity of the produced-block channel between the producer and the
/// propagation task.
const PRODUCED_CHANNEL_CAPACITY: usize = 64;
/// How long `stop` waits for each background task.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running POHA node.
pub struct PohaNode {
    pub config: NodeConfig,
    pub ledger: Arc<MemoryLedger>,
    pub consensus: Arc<HybridConsensus>,
    pub network: Arc<PeerNetwork>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,

    /// The registry behind an internal or simulator verifier.
    registry: Option<Arc<HumanityRegistry>>,
    simulator: Option<Arc<SimulatorGateway>>,
    /// Taken by the propagation task on start.
    produced_rx: Option<mpsc::Receiver<Block>>,
    metrics_addr: Option<SocketAddr>,
    started: bool,
    task_handles: Vec<JoinHandle<()>>,
}

impl PohaNode {
    /// Build the node and bind its listeners. Background work begins with
    /// [`start`](Self::start).
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let shutdown = Arc::new(ShutdownController::new());
        match Self::build(config, Arc::clone(&shutdown)).await {
            Ok(node) => Ok(node),
            Err(e) => {
                // Stop whatever the partial build already spawned.
                shutdown.shutdown();
                Err(e)
            }
        }
    }

    async fn build(
        config: NodeConfig,
        shutdown: Arc<ShutdownController>,
    ) -> Result<Self, NodeError> {
        let keys = config.key_pair()?;
        let metrics = Arc::new(NodeMetrics::new()?);
        let ledger = Arc::new(MemoryLedger::new());

        let (verifier, registry, simulator) = match config.verifier_mode()? {
            VerifierMode::Internal => {
                let registry = HumanityRegistry::start(config.registry_config(), &shutdown);
                (HumanityVerifier::Internal(Arc::clone(&registry)), Some(registry), None)
            }
            VerifierMode::Simulator { port } => {
                let registry = HumanityRegistry::start(config.registry_config(), &shutdown);
                let simulator =
                    SimulatorGateway::start(port, Arc::clone(&registry), &shutdown).await?;
                (
                    HumanityVerifier::Simulator(Arc::clone(&simulator)),
                    Some(registry),
                    Some(simulator),
                )
            }
            VerifierMode::Remote { base_url, api_key } => {
                let remote = RemoteGateway::new(base_url, api_key)?;
                (HumanityVerifier::Remote(Arc::new(remote)), None, None)
            }
        };

        let (produced_tx, produced_rx) = mpsc::channel(PRODUCED_CHANNEL_CAPACITY);
        let authority = AuthorityConsensus::new(
            keys,
            ValidatorSet::new(config.validator_addresses()),
            config.authority_config(),
            ledger.clone(),
            produced_tx,
            Arc::clone(&shutdown),
        );
        let consensus = Arc::new(HybridConsensus::new(authority, verifier, ledger.clone()));

        let chain = Arc::new(VerifyingChain::new(
            Arc::clone(&ledger),
            Arc::clone(&consensus),
            Arc::clone(&metrics),
        ));
        let network = PeerNetwork::bind(config.network_config(), chain).await?;

        info!(
            address = %consensus.address(),
            verifier = consensus.verifier().name(),
            listen = %network.local_addr(),
            "node initialised"
        );

        Ok(Self {
            config,
            ledger,
            consensus,
            network,
            metrics,
            shutdown,
            registry,
            simulator,
            produced_rx: Some(produced_rx),
            metrics_addr: None,
            started: false,
            task_handles: Vec::new(),
        })
    }

    /// Start the network, the propagation and status tasks, and the metrics
    /// endpoint; dial the bootstrap peers; then self-verify and start mining
    /// when configured to.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.started {
            return Err(NodeError::AlreadyStarted);
        }
        self.started = true;

        let handles = self.network.spawn(&self.shutdown).await?;
        self.task_handles.extend(handles);

        // ── Produced block propagation ─────────────────────────────────────
        if let Some(produced_rx) = self.produced_rx.take() {
            let network = Arc::clone(&self.network);
            let metrics = Arc::clone(&self.metrics);
            let shutdown_rx = self.shutdown.subscribe();
            self.task_handles.push(tokio::spawn(propagate_produced(
                network,
                metrics,
                produced_rx,
                shutdown_rx,
            )));
        }

        // ── Periodic gauge refresh ─────────────────────────────────────────
        {
            let network = Arc::clone(&self.network);
            let ledger = Arc::clone(&self.ledger);
            let metrics = Arc::clone(&self.metrics);
            let shutdown_rx = self.shutdown.subscribe();
            let period = self.config.network_config().discovery_interval;
            self.task_handles.push(tokio::spawn(refresh_gauges(
                network,
                ledger,
                metrics,
                period,
                shutdown_rx,
            )));
        }

        if let Some(addr) = self.config.metrics_addr.clone() {
            let bound = metrics::serve(&addr, Arc::clone(&self.metrics), &self.shutdown).await?;
            self.metrics_addr = Some(bound);
        }

        for peer in self.config.bootstrap_peers.clone() {
            match self.network.connect_to_peer(&peer).await {
                Ok(added) => debug!(%peer, added, "bootstrap peer dialed"),
                Err(e) => warn!(%peer, "bootstrap peer unreachable: {e}"),
            }
        }
        self.metrics.peer_count.set(self.network.peer_count().await as i64);

        if self.config.dev_auto_verify {
            if let Err(e) = self.self_verify().await {
                warn!("development self-verification failed: {e}");
            }
        }

        if self.config.mine {
            self.mine_on_boot().await;
        }

        info!(
            address = %self.address(),
            advertised = %self.network.self_address(),
            peers = self.network.peer_count().await,
            "POHA node started"
        );
        Ok(())
    }

    /// Stop mining, signal every task, and wait for them to finish.
    pub async fn stop(&mut self) {
        info!("POHA node stopping");
        self.consensus.stop_mining().await;
        self.shutdown.shutdown();

        for handle in self.task_handles.drain(..) {
            match tokio::time::timeout(TASK_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("background task ended abnormally: {e}"),
                Err(_) => warn!("background task did not stop in time"),
            }
        }
        info!("POHA node stopped");
    }

    pub fn address(&self) -> &Address {
        self.consensus.address()
    }

    /// The address peers know this node by.
    pub fn self_address(&self) -> &str {
        self.network.self_address()
    }

    pub fn registry(&self) -> Option<&Arc<HumanityRegistry>> {
        self.registry.as_ref()
    }

    /// Base URL of the local humanity simulator, when running one.
    pub fn simulator_url(&self) -> Option<&str> {
        self.simulator.as_deref().map(SimulatorGateway::base_url)
    }

    /// Where the metrics endpoint is bound, once started.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Development only: mark this node's address verified in the local
    /// registry. With the simulator the verification is first initiated
    /// through the consensus layer so that it caches the same token.
    pub async fn self_verify(&self) -> Result<(), NodeError> {
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| NodeError::Config("no local humanity registry".into()))?;
        let address = self.address().clone();

        let token = if self.consensus.verifier().gateway().is_none() {
            registry.register_verification(&address)
        } else {
            match self.consensus.register_as_validator().await {
                Ok(()) => return Ok(()),
                Err(ConsensusError::HumanVerificationRequired { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            registry
                .record(&address)
                .map(|record| record.token)
                .ok_or_else(|| HumanityError::NotFound(address.to_string()))?
        };

        registry.complete_verification(&address, &token)?;
        info!(%address, "development self-verification complete");
        Ok(())
    }

    pub async fn register_as_validator(&self) -> Result<(), NodeError> {
        Ok(self.consensus.register_as_validator().await?)
    }

    pub async fn start_mining(&self) -> Result<(), NodeError> {
        Ok(self.consensus.start_mining().await?)
    }

    pub async fn stop_mining(&self) {
        self.consensus.stop_mining().await;
    }

    pub async fn is_mining(&self) -> bool {
        self.consensus.is_mining().await
    }

    /// Run one production attempt outside the mining loop. A produced block
    /// is propagated like any mined block.
    pub async fn produce_block(&self) -> Result<Option<Block>, NodeError> {
        Ok(self.consensus.authority().produce_block().await?)
    }

    /// Replace the validator set. Refused in internal mode for more than one
    /// validator.
    pub async fn update_validator_list(&self, addresses: Vec<Address>) -> Result<(), NodeError> {
        if matches!(self.consensus.verifier(), HumanityVerifier::Internal(_)) {
            check_internal_validators(&addresses)?;
        }
        self.consensus.update_validator_list(addresses).await;
        Ok(())
    }

    /// Queue a transaction locally and broadcast it to every peer.
    pub async fn submit_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<BroadcastResult, NodeError> {
        self.ledger.add_transaction(transaction.clone()).await?;
        self.metrics.transactions_received.inc();

        let result = self.network.broadcast_transaction(&transaction).await?;
        record_broadcast(&self.metrics, &result);
        debug!(
            id = %transaction.id,
            sent = result.sent,
            failed = result.failed,
            "transaction submitted"
        );
        Ok(result)
    }

    pub async fn connect_to_peer(&self, address: &str) -> Result<bool, NodeError> {
        let added = self.network.connect_to_peer(address).await?;
        self.metrics.peer_count.set(self.network.peer_count().await as i64);
        Ok(added)
    }

    pub async fn height(&self) -> u64 {
        self.ledger.height().await
    }

    async fn mine_on_boot(&self) {
        match self.consensus.register_as_validator().await {
            Ok(()) => {}
            Err(ConsensusError::HumanVerificationRequired { url: Some(url), .. }) => {
                warn!(%url, "complete human verification, then start mining");
                return;
            }
            Err(e) => {
                warn!("cannot mine: {e}");
                return;
            }
        }
        if let Err(e) = self.consensus.start_mining().await {
            warn!("cannot mine: {e}");
        }
    }
}

fn record_broadcast(metrics: &NodeMetrics, result: &BroadcastResult) {
    metrics.broadcast_sent.inc_by(result.sent as u64);
    metrics.broadcast_failed.inc_by(result.failed as u64);
}

/// Broadcast every block the producer seals. Receivers never re-broadcast.
async fn propagate_produced(
    network: Arc<PeerNetwork>,
    metrics: Arc<NodeMetrics>,
    mut produced_rx: mpsc::Receiver<Block>,
    mut shutdown_rx: ShutdownSignal,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                debug!("block propagation task shutting down");
                break;
            }
            produced = produced_rx.recv() => {
                let Some(block) = produced else { break };
                metrics.blocks_produced.inc();
                metrics.chain_height.set(block.index as i64);

                match network.broadcast_block(&block).await {
                    Ok(result) => {
                        record_broadcast(&metrics, &result);
                        if result.failed > 0 {
                            warn!(
                                index = block.index,
                                sent = result.sent,
                                failed = result.failed,
                                "block broadcast partially failed"
                            );
                        } else {
                            debug!(index = block.index, sent = result.sent, "block broadcast");
                        }
                    }
                    Err(e) => warn!(index = block.index, "block broadcast failed: {e}"),
                }
                metrics.peer_count.set(network.peer_count().await as i64);
            }
        }
    }
}

async fn refresh_gauges(
    network: Arc<PeerNetwork>,
    ledger: Arc<MemoryLedger>,
    metrics: Arc<NodeMetrics>,
    period: Duration,
    mut shutdown_rx: ShutdownSignal,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let peers = network.peer_count().await;
                let alive = network.peer_set().alive_count().await;
                let height = ledger.height().await;
                metrics.peer_count.set(peers as i64);
                metrics.chain_height.set(height as i64);
                debug!(peers, alive, height, "node status");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poha_consensus::RegistrationState;
    use poha_crypto::{derive_address, keypair_from_seed};

    fn seed_hex(seed: u8) -> String {
        hex::encode([seed; 32])
    }

    fn config(seed: u8) -> NodeConfig {
        let me = derive_address(&keypair_from_seed(&[seed; 32]).public);
        NodeConfig {
            listen_addr: "127.0.0.1:0".into(),
            key_seed: Some(seed_hex(seed)),
            validators: vec![me.to_string()],
            discovery_interval_secs: 3600,
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn internal_self_verify_then_register() {
        let mut node = PohaNode::new(config(1)).await.unwrap();
        node.start().await.unwrap();

        assert!(node.register_as_validator().await.is_err());
        node.self_verify().await.unwrap();
        node.register_as_validator().await.unwrap();
        assert_eq!(node.consensus.state().await, RegistrationState::Validator);

        let block = node.produce_block().await.unwrap().unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(node.height().await, 1);
        node.stop().await;
    }

    #[tokio::test]
    async fn simulator_self_verify_caches_the_same_token() {
        let mut node = PohaNode::new(NodeConfig {
            use_poh_simulator: true,
            poh_simulator_port: 0,
            ..config(2)
        })
        .await
        .unwrap();
        node.start().await.unwrap();
        assert!(node.simulator_url().is_some());

        node.self_verify().await.unwrap();
        node.register_as_validator().await.unwrap();

        let registry = node.registry().unwrap();
        let token = registry.get_proof_token(node.address()).unwrap();
        assert_eq!(node.consensus.authority().human_proof().await, Some(token));
        node.stop().await;
    }

    #[tokio::test]
    async fn remote_mode_has_no_local_registry() {
        let node = PohaNode::new(NodeConfig {
            use_external_poh: true,
            external_poh_base_url: Some("http://127.0.0.1:9".into()),
            ..config(3)
        })
        .await
        .unwrap();
        assert!(node.registry().is_none());
        assert!(matches!(node.self_verify().await, Err(NodeError::Config(_))));
        node.shutdown.shutdown();
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let mut node = PohaNode::new(config(4)).await.unwrap();
        node.start().await.unwrap();
        assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));
        node.stop().await;
    }

    #[tokio::test]
    async fn internal_mode_refuses_a_second_validator() {
        let node = PohaNode::new(config(6)).await.unwrap();
        let me = node.address().clone();

        let result = node
            .update_validator_list(vec![me.clone(), Address::from("V2")])
            .await;
        assert!(matches!(result, Err(NodeError::Config(_))));
        assert_eq!(node.consensus.validators().await.to_vec(), vec![me.clone()]);

        let two = NodeConfig {
            validators: vec![me.to_string(), "V2".into()],
            ..config(7)
        };
        assert!(matches!(PohaNode::new(two).await, Err(NodeError::Config(_))));
        node.shutdown.shutdown();
    }

    #[tokio::test]
    async fn bad_config_fails_construction() {
        let result = PohaNode::new(NodeConfig {
            key_seed: Some("nothex".into()),
            ..config(5)
        })
        .await;
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
