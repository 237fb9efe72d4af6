//! Local humanity verification service for development networks.
//!
//! The simulator owns a small axum server bound to loopback. Its backing
//! store is a [`HumanityRegistry`]; the node talks to that registry directly
//! while humans (or tests) drive it over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use poha_types::Address;
use poha_utils::ShutdownController;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::protocol::{
    self, ErrorResponse, InitiateRequest, InitiateResponse, TokenQuery, VerifiedResponse,
};
use crate::{HumanityError, HumanityGateway, HumanityRegistry, TokenStatus};

pub struct SimulatorGateway {
    registry: Arc<HumanityRegistry>,
    local_addr: SocketAddr,
    base_url: String,
}

impl SimulatorGateway {
    /// Bind the simulator on `127.0.0.1:port` (0 picks a free port) and
    /// serve until `shutdown` fires.
    pub async fn start(
        port: u16,
        registry: Arc<HumanityRegistry>,
        shutdown: &ShutdownController,
    ) -> Result<Arc<Self>, HumanityError> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
        let local_addr = listener.local_addr()?;
        let app = router(Arc::clone(&registry));

        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_rx.recv().await });
            if let Err(e) = server.await {
                warn!("humanity simulator stopped: {e}");
            }
            debug!("humanity simulator shut down");
        });

        info!(%local_addr, "humanity simulator listening");
        Ok(Arc::new(Self {
            registry,
            local_addr,
            base_url: format!("http://{local_addr}"),
        }))
    }

    pub fn registry(&self) -> &Arc<HumanityRegistry> {
        &self.registry
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HumanityGateway for SimulatorGateway {
    fn name(&self) -> &'static str {
        "simulator"
    }

    async fn initiate_verification(&self, address: &Address) -> Result<String, HumanityError> {
        Ok(self.registry.register_verification(address))
    }

    async fn token_status(
        &self,
        address: &Address,
        token: &str,
    ) -> Result<TokenStatus, HumanityError> {
        check_token(&self.registry, address, token)
    }

    fn verification_url(&self, address: &Address, token: &str) -> String {
        protocol::verify_page_url(&self.base_url, address.as_str(), token)
    }
}

fn check_token(
    registry: &HumanityRegistry,
    address: &Address,
    token: &str,
) -> Result<TokenStatus, HumanityError> {
    if token.is_empty() {
        return Err(HumanityError::EmptyToken);
    }
    registry
        .token_status(address, token)
        .ok_or_else(|| HumanityError::VerificationNotFound(address.to_string()))
}

fn router(registry: Arc<HumanityRegistry>) -> Router {
    Router::new()
        .route(protocol::INITIATE_PATH, post(initiate))
        .route(protocol::STATUS_PATH, get(status))
        .route(protocol::COMPLETE_PATH, post(complete))
        .route(protocol::VERIFY_PAGE_PATH, get(verify_page))
        .with_state(registry)
}

/// A protocol error rendered as `{error}` with a status code.
struct ApiError(StatusCode, String);

impl From<HumanityError> for ApiError {
    fn from(e: HumanityError) -> Self {
        let status = match e {
            HumanityError::NotFound(_) | HumanityError::VerificationNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            HumanityError::TokenMismatch(_) | HumanityError::EmptyToken => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

async fn initiate(
    State(registry): State<Arc<HumanityRegistry>>,
    Json(req): Json<InitiateRequest>,
) -> Result<Json<InitiateResponse>, ApiError> {
    if req.address.is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "address is empty".into()));
    }
    let token = registry.register_verification(&Address::from(req.address));
    Ok(Json(InitiateResponse { token }))
}

async fn status(
    State(registry): State<Arc<HumanityRegistry>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let status = check_token(&registry, &Address::from(query.address), &query.token)?;
    Ok(Json(VerifiedResponse::from(status)))
}

async fn complete(
    State(registry): State<Arc<HumanityRegistry>>,
    Json(req): Json<TokenQuery>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    registry.complete_verification(&Address::from(req.address), &req.token)?;
    Ok(Json(VerifiedResponse::from(TokenStatus::Verified)))
}

async fn verify_page(
    State(registry): State<Arc<HumanityRegistry>>,
    Query(query): Query<TokenQuery>,
) -> Result<String, ApiError> {
    let address = Address::from(query.address);
    registry.complete_verification(&address, &query.token)?;
    Ok(format!("{address} verified as human\n"))
}
