//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::BotError;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for external APIs
pub struct HttpClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BotError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| BotError::ConfigError(format!("invalid base url `{}`: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BotError::ConfigError(format!(
                "unsupported url scheme `{}` in `{}`",
                parsed.scheme(),
                base_url
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Create a new HTTP client sending `api_key` as a bearer token
    pub fn with_api_key(base_url: &str, timeout: Duration, api_key: SecretString) -> Result<Self, BotError> {
        let mut client = Self::new(base_url, timeout)?;
        client.api_key = Some(api_key);
        Ok(client)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request against `path`, authenticated when an API key is set
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()));
        }
        request
    }

    /// Send a request and decode the JSON body. `label` is what gets logged,
    /// so callers can keep secrets embedded in the path out of the logs.
    pub async fn send<T: DeserializeOwned>(&self, label: &str, request: RequestBuilder) -> Result<T, BotError> {
        debug!("{}", label);

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("{} failed: {} - {}", label, status, body);
            return Err(BotError::ExternalCall(format!("{}: {}", status, body)));
        }

        let body = response.json().await?;
        Ok(body)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BotError> {
        self.send(&format!("GET {}", path), self.request(Method::GET, path))
            .await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, BotError> {
        self.send(&format!("POST {}", path), self.request(Method::POST, path).json(body))
            .await
    }

    /// Make a DELETE request, ignoring any response body
    pub async fn delete(&self, path: &str) -> Result<(), BotError> {
        debug!("DELETE {}", path);

        let response = self.request(Method::DELETE, path).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("DELETE {} failed: {} - {}", path, status, body);
            return Err(BotError::ExternalCall(format!("{}: {}", status, body)));
        }

        Ok(())
    }
}
