//! The peer network: listener, peer set, discovery, and broadcast.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use poha_ledger::Blockchain;
use poha_types::{Block, Transaction};
use poha_utils::ShutdownController;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{self, BroadcastResult};
use crate::message::{BlockMessage, DiscoveryMessage, Envelope, MessageType, TransactionMessage};
use crate::{HandlerRegistry, NetworkError, PeerSet};

/// Largest message a peer may send.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Deadline for reading one inbound message.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub listen_addr: String,
    /// Address advertised to peers. Defaults to the bound address.
    pub public_addr: Option<String>,
    pub max_peers: usize,
    pub discovery_interval: Duration,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub max_message_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7600".into(),
            public_addr: None,
            max_peers: 50,
            discovery_interval: Duration::from_secs(30),
            connect_timeout: CONNECT_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }
}

pub struct PeerNetwork {
    /// Taken by the accept loop when the network starts.
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    self_address: String,
    peers: PeerSet,
    handlers: HandlerRegistry,
    config: NetworkConfig,
}

impl PeerNetwork {
    /// Bind the listener and install the built-in handlers, which feed
    /// blocks and transactions into `chain`. Nothing is accepted until
    /// [`spawn`](Self::spawn).
    pub async fn bind(
        config: NetworkConfig,
        chain: Arc<dyn Blockchain>,
    ) -> Result<Arc<Self>, NetworkError> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| NetworkError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        let self_address = advertised_address(&config, local_addr);

        let network = Arc::new_cyclic(|weak: &Weak<Self>| {
            let handlers = HandlerRegistry::new();
            install_builtin_handlers(&handlers, chain, weak.clone());
            Self {
                listener: Mutex::new(Some(listener)),
                local_addr,
                self_address,
                peers: PeerSet::new(config.max_peers),
                handlers,
                config,
            }
        });

        info!(
            listen = %network.local_addr,
            advertised = %network.self_address,
            "peer network bound"
        );
        Ok(network)
    }

    /// Start the accept loop and the periodic discovery task. Both stop when
    /// `shutdown` fires; the listener is dropped with the accept loop.
    pub async fn spawn(
        self: &Arc<Self>,
        shutdown: &ShutdownController,
    ) -> Result<Vec<JoinHandle<()>>, NetworkError> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or(NetworkError::AlreadyStarted)?;

        let accept = {
            let network = Arc::clone(self);
            let mut shutdown_rx = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            debug!("accept loop shutting down");
                            break;
                        }
                        accepted = listener.accept() => match accepted {
                            Ok((stream, remote)) => {
                                let network = Arc::clone(&network);
                                tokio::spawn(async move {
                                    network.handle_connection(stream, remote).await;
                                });
                            }
                            Err(e) => warn!("accept failed: {e}"),
                        }
                    }
                }
            })
        };

        let discovery = {
            let network = Arc::clone(self);
            let mut shutdown_rx = shutdown.subscribe();
            let period = self.config.discovery_interval;
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            debug!("discovery task shutting down");
                            break;
                        }
                        _ = interval.tick() => {
                            if !network.peers.is_empty().await {
                                match network.announce().await {
                                    Ok(result) => debug!(
                                        sent = result.sent,
                                        failed = result.failed,
                                        "discovery round"
                                    ),
                                    Err(e) => warn!("discovery round failed: {e}"),
                                }
                            }
                        }
                    }
                }
            })
        };

        Ok(vec![accept, discovery])
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The address this node advertises in discovery and `from` fields.
    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn peer_set(&self) -> &PeerSet {
        &self.peers
    }

    pub async fn peers(&self) -> Vec<String> {
        self.peers.addresses().await
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.len().await
    }

    fn is_self(&self, address: &str) -> bool {
        address == self.self_address || address == self.local_addr.to_string()
    }

    /// Dial `address`, add it to the peer set, and introduce ourselves on
    /// that connection. Returns `false` without dialing when the address is
    /// ourselves or already known.
    pub async fn connect_to_peer(&self, address: &str) -> Result<bool, NetworkError> {
        let address = address.trim();
        if address.is_empty() || self.is_self(address) || self.peers.contains(address).await {
            return Ok(false);
        }

        let mut stream = broadcast::dial(address, self.config.connect_timeout).await?;
        if !self.peers.insert(address).await? {
            return Ok(false);
        }
        info!(peer = address, "connected to peer");

        let bytes = self.discovery_envelope().await?.to_bytes()?;
        if let Err(e) =
            broadcast::write_message(&mut stream, address, &bytes, self.config.write_timeout).await
        {
            debug!(peer = address, "introduction failed: {e}");
            self.peers.mark(address, false).await;
        }
        Ok(true)
    }

    /// Send one message to every known peer.
    pub async fn broadcast<T: Serialize>(
        &self,
        msg_type: &str,
        payload: &T,
    ) -> Result<BroadcastResult, NetworkError> {
        let bytes = Envelope::new(msg_type, self.self_address.clone(), payload)?.to_bytes()?;
        let targets = self.peers.addresses().await;

        let sends = targets.iter().map(|peer| {
            let bytes = &bytes;
            async move {
                let outcome = broadcast::send_message(
                    peer,
                    bytes,
                    self.config.connect_timeout,
                    self.config.write_timeout,
                )
                .await;
                (peer, outcome)
            }
        });

        let mut result = BroadcastResult::default();
        for (peer, outcome) in join_all(sends).await {
            let ok = match outcome {
                Ok(()) => true,
                Err(e) => {
                    warn!(peer = %peer, %msg_type, "send failed: {e}");
                    false
                }
            };
            self.peers.mark(peer, ok).await;
            result.record(ok);
        }
        Ok(result)
    }

    /// Send one message to a single peer and record its liveness.
    pub async fn send_to<T: Serialize>(
        &self,
        peer: &str,
        msg_type: &str,
        payload: &T,
    ) -> Result<(), NetworkError> {
        let bytes = Envelope::new(msg_type, self.self_address.clone(), payload)?.to_bytes()?;
        let outcome = broadcast::send_message(
            peer,
            &bytes,
            self.config.connect_timeout,
            self.config.write_timeout,
        )
        .await;
        self.peers.mark(peer, outcome.is_ok()).await;
        outcome
    }

    pub async fn broadcast_block(&self, block: &Block) -> Result<BroadcastResult, NetworkError> {
        self.broadcast(MessageType::BLOCK, &BlockMessage { block: block.clone() })
            .await
    }

    pub async fn broadcast_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<BroadcastResult, NetworkError> {
        let msg = TransactionMessage {
            transaction: transaction.clone(),
        };
        self.broadcast(MessageType::TRANSACTION, &msg).await
    }

    /// Send our discovery message (self + known peers) to every known peer.
    pub async fn announce(&self) -> Result<BroadcastResult, NetworkError> {
        let msg = self.discovery_message().await;
        self.broadcast(MessageType::DISCOVERY, &msg).await
    }

    pub async fn discovery_message(&self) -> DiscoveryMessage {
        let mut peer_addresses = vec![self.self_address.clone()];
        peer_addresses.extend(self.peers.addresses().await);
        DiscoveryMessage { peer_addresses }
    }

    async fn discovery_envelope(&self) -> Result<Envelope, NetworkError> {
        let msg = self.discovery_message().await;
        Envelope::new(MessageType::DISCOVERY, self.self_address.clone(), &msg)
    }

    async fn handle_connection(&self, stream: TcpStream, remote: SocketAddr) {
        let peer = remote.to_string();
        let bytes = match broadcast::read_message(
            stream,
            &peer,
            self.config.max_message_bytes,
            self.config.read_timeout,
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(%peer, "dropping connection: {e}");
                return;
            }
        };
        if bytes.is_empty() {
            return;
        }

        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%peer, "undecodable message: {e}");
                return;
            }
        };

        let msg_type = envelope.msg_type.clone();
        let from = envelope.from.clone();
        match self.handlers.dispatch(envelope).await {
            Ok(()) => debug!(%from, %msg_type, "message handled"),
            Err(NetworkError::UnknownMessageType(t)) => {
                debug!(%from, msg_type = %t, "no handler, message dropped")
            }
            Err(e) => warn!(%from, %msg_type, "message rejected: {e}"),
        }
    }
}

fn advertised_address(config: &NetworkConfig, local_addr: SocketAddr) -> String {
    if let Some(public) = config.public_addr.as_deref().filter(|p| !p.is_empty()) {
        return public.to_string();
    }
    if local_addr.ip().is_unspecified() {
        warn!(
            %local_addr,
            "listening on a wildcard address without public_addr; advertising loopback"
        );
        return format!("127.0.0.1:{}", local_addr.port());
    }
    local_addr.to_string()
}

fn install_builtin_handlers(
    handlers: &HandlerRegistry,
    chain: Arc<dyn Blockchain>,
    network: Weak<PeerNetwork>,
) {
    let block_chain = Arc::clone(&chain);
    handlers.register(MessageType::BLOCK, move |envelope| {
        let chain = Arc::clone(&block_chain);
        async move {
            let msg: BlockMessage = envelope.payload_as()?;
            let index = msg.block.index;
            chain.add_block(msg.block).await?;
            debug!(index, from = %envelope.from, "block accepted from peer");
            Ok(())
        }
    });

    handlers.register(MessageType::TRANSACTION, move |envelope| {
        let chain = Arc::clone(&chain);
        async move {
            let msg: TransactionMessage = envelope.payload_as()?;
            chain.add_transaction(msg.transaction).await?;
            Ok(())
        }
    });

    // Received discovery lists are never re-broadcast; only the periodic
    // announce sends discovery traffic.
    handlers.register(MessageType::DISCOVERY, move |envelope| {
        let network = network.clone();
        async move {
            let msg: DiscoveryMessage = envelope.payload_as()?;
            let Some(network) = network.upgrade() else {
                return Ok(());
            };
            for address in msg.peer_addresses {
                if network.is_self(&address) || network.peers.contains(&address).await {
                    continue;
                }
                let network = Arc::clone(&network);
                tokio::spawn(async move {
                    if let Err(e) = network.connect_to_peer(&address).await {
                        debug!(peer = %address, "discovered peer unreachable: {e}");
                    }
                });
            }
            Ok(())
        }
    });
}
