//! HTTP verification protocol shared by the simulator server and the remote
//! client.
//!
//! | method | path                    | body / query       | response              |
//! |--------|-------------------------|--------------------|-----------------------|
//! | POST   | `/verification/initiate`| `{address}`        | `{token}`             |
//! | GET    | `/verification/status`  | `?address&token`   | `{verified, pending}` |
//! | POST   | `/verification/complete`| `{address, token}` | `{verified, pending}` |
//! | GET    | `/verify`               | `?address&token`   | human-facing page     |
//!
//! Failures carry `{error}` with a 400 (bad token) or 404 (unknown address).

use serde::{Deserialize, Serialize};

use crate::TokenStatus;

pub const INITIATE_PATH: &str = "/verification/initiate";
pub const STATUS_PATH: &str = "/verification/status";
pub const COMPLETE_PATH: &str = "/verification/complete";
pub const VERIFY_PAGE_PATH: &str = "/verify";

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiateResponse {
    pub token: String,
}

/// Query for `status` and the `/verify` page; body for `complete`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenQuery {
    pub address: String,
    pub token: String,
}

/// `pending` is true while the token is the latest one and awaits completion.
/// Services that omit it are read as "not pending".
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifiedResponse {
    pub verified: bool,
    #[serde(default)]
    pub pending: bool,
}

impl VerifiedResponse {
    pub fn token_status(&self) -> TokenStatus {
        match (self.verified, self.pending) {
            (true, _) => TokenStatus::Verified,
            (false, true) => TokenStatus::Pending,
            (false, false) => TokenStatus::Invalid,
        }
    }
}

impl From<TokenStatus> for VerifiedResponse {
    fn from(status: TokenStatus) -> Self {
        Self {
            verified: status == TokenStatus::Verified,
            pending: status == TokenStatus::Pending,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `{base}/verify?address=..&token=..`, percent-encoded.
pub fn verify_page_url(base_url: &str, address: &str, token: &str) -> String {
    let page = format!("{}{}", base_url.trim_end_matches('/'), VERIFY_PAGE_PATH);
    match reqwest::Url::parse_with_params(&page, &[("address", address), ("token", token)]) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{page}?address={address}&token={token}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_url_encodes_parameters() {
        let url = verify_page_url("http://127.0.0.1:7700/", "a b", "t&1");
        assert_eq!(url, "http://127.0.0.1:7700/verify?address=a+b&token=t%261");
    }

    #[test]
    fn status_body_carries_every_token_status() {
        for status in [TokenStatus::Verified, TokenStatus::Pending, TokenStatus::Invalid] {
            assert_eq!(VerifiedResponse::from(status).token_status(), status);
        }
        let bare = VerifiedResponse {
            verified: false,
            pending: false,
        };
        assert_eq!(bare.token_status(), TokenStatus::Invalid);
    }
}
