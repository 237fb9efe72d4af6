//! Prometheus metrics for the POHA node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; [`NodeMetrics::gather`]
//! renders it in the text exposition format and [`serve`] exposes that on
//! `GET /metrics`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use poha_utils::ShutdownController;
use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::NodeError;

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Blocks sealed by this node's producer.
    pub blocks_produced: IntCounter,
    /// Peer blocks that passed hybrid verification and were appended.
    pub blocks_accepted: IntCounter,
    /// Peer blocks refused by verification or the ledger.
    pub blocks_rejected: IntCounter,
    /// Transactions admitted to the pending pool (local or from peers).
    pub transactions_received: IntCounter,
    pub broadcast_sent: IntCounter,
    pub broadcast_failed: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub peer_count: IntGauge,
    pub chain_height: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let blocks_produced = register_int_counter_with_registry!(
            Opts::new("poha_blocks_produced_total", "Blocks produced by this node"),
            registry
        )?;
        let blocks_accepted = register_int_counter_with_registry!(
            Opts::new("poha_blocks_accepted_total", "Peer blocks accepted"),
            registry
        )?;
        let blocks_rejected = register_int_counter_with_registry!(
            Opts::new("poha_blocks_rejected_total", "Peer blocks rejected"),
            registry
        )?;
        let transactions_received = register_int_counter_with_registry!(
            Opts::new(
                "poha_transactions_received_total",
                "Transactions admitted to the pending pool"
            ),
            registry
        )?;
        let broadcast_sent = register_int_counter_with_registry!(
            Opts::new("poha_broadcast_sent_total", "Broadcast sends that reached a peer"),
            registry
        )?;
        let broadcast_failed = register_int_counter_with_registry!(
            Opts::new("poha_broadcast_failed_total", "Broadcast sends that failed"),
            registry
        )?;

        let peer_count = register_int_gauge_with_registry!(
            Opts::new("poha_peer_count", "Current number of known peers"),
            registry
        )?;
        let chain_height = register_int_gauge_with_registry!(
            Opts::new("poha_chain_height", "Index of the local chain head"),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_produced,
            blocks_accepted,
            blocks_rejected,
            transactions_received,
            broadcast_sent,
            broadcast_failed,
            peer_count,
            chain_height,
        })
    }

    /// Text exposition of every registered metric.
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!("failed to encode metrics: {e}");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Serve `GET /metrics` on `addr` until `shutdown` fires.
pub async fn serve(
    addr: &str,
    metrics: Arc<NodeMetrics>,
    shutdown: &ShutdownController,
) -> Result<SocketAddr, NodeError> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let app = Router::new()
        .route("/metrics", get(render))
        .with_state(metrics);

    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown_rx.recv().await });
        if let Err(e) = server.await {
            warn!("metrics endpoint stopped: {e}");
        }
        debug!("metrics endpoint shut down");
    });

    info!(%local_addr, "metrics endpoint listening");
    Ok(local_addr)
}

async fn render(State(metrics): State<Arc<NodeMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.gather(),
    )
}
