//! Reachability probes for deployed services

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::debug;

use crate::errors::BotError;
use crate::models::deployment::Deployment;

/// Best-effort check of whether a deployed service is up
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn is_reachable(&self, deployment: &Deployment) -> bool;
}

/// Probe that GETs the service's public URL
pub struct HttpStatusProbe {
    client: Client,
}

impl HttpStatusProbe {
    pub fn new(timeout: Duration) -> Result<Self, BotError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn is_reachable(&self, deployment: &Deployment) -> bool {
        let Some(url) = &deployment.url else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(response) => {
                debug!("Probe {} -> {}", url, response.status());
                response.status().is_success()
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Probe that treats a service as up once `warmup` has passed since creation
#[derive(Debug, Clone)]
pub struct ElapsedStatusProbe {
    warmup: Duration,
}

impl ElapsedStatusProbe {
    pub fn new(warmup: Duration) -> Self {
        Self { warmup }
    }
}

impl Default for ElapsedStatusProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl StatusProbe for ElapsedStatusProbe {
    async fn is_reachable(&self, deployment: &Deployment) -> bool {
        let elapsed = Utc::now().signed_duration_since(deployment.created_at);
        elapsed.to_std().map(|e| e >= self.warmup).unwrap_or(false)
    }
}
