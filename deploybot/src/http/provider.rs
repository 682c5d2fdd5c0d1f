//! Hosting provider boundary

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::BotError;
use crate::http::client::HttpClient;

/// Python version pinned for deployed services
pub const PYTHON_VERSION: &str = "3.11.0";

/// Environment variable carrying a service's bot token
pub const TOKEN_ENV: &str = "BOT_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Service creation request
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(rename = "type")]
    pub service_type: String,
    pub name: String,
    pub runtime: String,
    pub region: String,
    pub plan: String,
    pub env_vars: Vec<EnvVar>,
    pub build_command: String,
    pub start_command: String,
    pub health_check_path: String,
}

impl ServiceSpec {
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env_vars
            .iter()
            .find(|var| var.key == key)
            .map(|var| var.value.as_str())
    }
}

impl std::fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env: Vec<(&str, &str)> = self
            .env_vars
            .iter()
            .map(|var| {
                let value = if var.key == TOKEN_ENV { "<redacted>" } else { var.value.as_str() };
                (var.key.as_str(), value)
            })
            .collect();
        f.debug_struct("ServiceSpec")
            .field("service_type", &self.service_type)
            .field("name", &self.name)
            .field("runtime", &self.runtime)
            .field("region", &self.region)
            .field("plan", &self.plan)
            .field("env_vars", &env)
            .field("build_command", &self.build_command)
            .field("start_command", &self.start_command)
            .field("health_check_path", &self.health_check_path)
            .finish()
    }
}

/// A service the provider created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedService {
    pub url: String,
    #[serde(alias = "id")]
    pub provider_service_id: String,
}

/// Creates and tears down hosted services
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<ProvisionedService, BotError>;

    /// Tear down a service. Callers treat failures as best-effort.
    async fn delete_service(&self, provider_service_id: &str) -> Result<(), BotError>;
}

/// REST provider client
pub struct HttpProvisioner {
    client: HttpClient,
}

impl HttpProvisioner {
    pub fn new(api_url: &str, api_key: SecretString, timeout: Duration) -> Result<Self, BotError> {
        Ok(Self {
            client: HttpClient::with_api_key(api_url, timeout, api_key)?,
        })
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<ProvisionedService, BotError> {
        info!("Creating service {} at {}", spec.name, self.client.base_url());
        let service: ProvisionedService = self
            .client
            .post("/services", spec)
            .await
            .map_err(|e| match e {
                BotError::ExternalCall(msg) => BotError::ExternalCall(msg),
                other => BotError::ExternalCall(other.to_string()),
            })?;
        debug!("Service {} created as {}", spec.name, service.provider_service_id);
        Ok(service)
    }

    async fn delete_service(&self, provider_service_id: &str) -> Result<(), BotError> {
        self.client
            .delete(&format!("/services/{}", provider_service_id))
            .await
    }
}

/// Provider stand-in that derives the service's references from its name
#[derive(Debug, Clone)]
pub struct SimulatedProvisioner {
    delay: Duration,
    domain: String,
}

impl SimulatedProvisioner {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            domain: "onrender.com".to_string(),
        }
    }
}

impl Default for SimulatedProvisioner {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<ProvisionedService, BotError> {
        tokio::time::sleep(self.delay).await;
        Ok(ProvisionedService {
            url: format!("https://{}.{}", spec.name, self.domain),
            provider_service_id: format!("svc_{}", spec.name),
        })
    }

    async fn delete_service(&self, provider_service_id: &str) -> Result<(), BotError> {
        debug!("Simulated teardown of {}", provider_service_id);
        Ok(())
    }
}
