//! HTTP client for an external humanity verification service.

use std::time::Duration;

use async_trait::async_trait;
use poha_types::Address;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::protocol::{
    self, ErrorResponse, InitiateRequest, InitiateResponse, TokenQuery, VerifiedResponse,
};
use crate::{HumanityError, HumanityGateway, TokenStatus};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to a verification service at `base_url`. A configured API key is
/// sent as a bearer token on every request.
pub struct RemoteGateway {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteGateway {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, HumanityError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, HumanityError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(HumanityError::Gateway("base url is empty".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| HumanityError::Gateway(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http_client,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Report a verification as completed. Real services complete through
    /// their own user flow; this exists for services that accept a callback.
    pub async fn complete_verification(
        &self,
        address: &Address,
        token: &str,
    ) -> Result<bool, HumanityError> {
        let body = TokenQuery {
            address: address.to_string(),
            token: token.to_string(),
        };
        let request = self
            .http_client
            .post(self.url(protocol::COMPLETE_PATH))
            .json(&body);
        let resp: VerifiedResponse = self.send(request, address).await?;
        Ok(resp.verified)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        address: &Address,
    ) -> Result<T, HumanityError> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HumanityError::Unreachable(format!("request timed out: {e}"))
            } else if e.is_connect() {
                HumanityError::Unreachable(format!("connection failed: {e}"))
            } else {
                HumanityError::Gateway(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HumanityError::VerificationNotFound(address.to_string()));
        }
        if !status.is_success() {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_default();
            return Err(HumanityError::Gateway(format!("HTTP status {status}: {detail}")));
        }

        response
            .json()
            .await
            .map_err(|e| HumanityError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl HumanityGateway for RemoteGateway {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn initiate_verification(&self, address: &Address) -> Result<String, HumanityError> {
        let body = InitiateRequest {
            address: address.to_string(),
        };
        let request = self
            .http_client
            .post(self.url(protocol::INITIATE_PATH))
            .json(&body);
        let resp: InitiateResponse = self.send(request, address).await?;
        if resp.token.is_empty() {
            return Err(HumanityError::InvalidResponse("service returned an empty token".into()));
        }
        debug!(%address, service = %self.base_url, "remote verification initiated");
        Ok(resp.token)
    }

    async fn token_status(
        &self,
        address: &Address,
        token: &str,
    ) -> Result<TokenStatus, HumanityError> {
        if token.is_empty() {
            return Err(HumanityError::EmptyToken);
        }
        let request = self
            .http_client
            .get(self.url(protocol::STATUS_PATH))
            .query(&[("address", address.as_str()), ("token", token)]);
        let resp: VerifiedResponse = self.send(request, address).await?;
        Ok(resp.token_status())
    }

    fn verification_url(&self, address: &Address, token: &str) -> String {
        protocol::verify_page_url(&self.base_url, address.as_str(), token)
    }
}
