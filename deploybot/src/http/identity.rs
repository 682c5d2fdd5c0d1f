//! Bot token identity verification

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::BotError;
use crate::http::client::HttpClient;
use crate::intake::validate::Rejection;

/// Default chat network API base
pub const DEFAULT_IDENTITY_BASE: &str = "https://api.telegram.org";

/// Identity of the bot a token belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

/// Checks a bot token against the chat network
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolve the identity behind `token`. A token the network refuses is a
    /// `Validation` error, a network that cannot answer is `ExternalCall`.
    async fn verify(&self, token: &str) -> Result<BotIdentity, BotError>;
}

#[derive(Deserialize)]
struct GetMeResponse {
    ok: bool,
    #[serde(default)]
    result: Option<BotIdentity>,
    #[serde(default)]
    description: Option<String>,
}

/// `getMe` based verifier
pub struct HttpIdentityVerifier {
    client: HttpClient,
}

impl HttpIdentityVerifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BotError> {
        Ok(Self {
            client: HttpClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<BotIdentity, BotError> {
        let path = format!("/bot{}/getMe", token);
        debug!("GET /bot<token>/getMe");

        // errors carry the request URL, which holds the token
        let response = match self.client.request(Method::GET, &path).send().await {
            Ok(response) => response,
            Err(e) => {
                let e = e.without_url();
                warn!("Identity check failed: {}", e);
                return Err(BotError::ExternalCall(format!("identity check failed: {}", e)));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            warn!("Identity check failed: {}", status);
            return Err(BotError::ExternalCall(format!("identity check failed: {}", status)));
        }

        let body: GetMeResponse = match response.json().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                warn!("Unreadable identity response: {}", e.without_url());
                return Err(BotError::ExternalCall("identity check returned an unreadable response".to_string()));
            }
            Err(_) => return Err(Rejection::TokenRejected(status.to_string()).into()),
        };

        match body {
            GetMeResponse {
                ok: true,
                result: Some(identity),
                ..
            } => {
                debug!(id = identity.id, "Token verified");
                Ok(identity)
            }
            GetMeResponse { description, .. } => Err(Rejection::TokenRejected(
                description.unwrap_or_else(|| "the chat network refused it".to_string()),
            )
            .into()),
        }
    }
}
