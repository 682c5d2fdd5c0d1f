//! Application state management

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, ProbeOptions, ProviderOptions};
use crate::chat::outbox::Outbox;
use crate::chat::router::Dispatcher;
use crate::control::service::ControlService;
use crate::deploy::executor::Executor;
use crate::deploy::supervisor::Supervisor;
use crate::errors::BotError;
use crate::http::identity::{HttpIdentityVerifier, IdentityVerifier};
use crate::http::probe::{ElapsedStatusProbe, HttpStatusProbe, StatusProbe};
use crate::http::provider::{HttpProvisioner, Provisioner, SimulatedProvisioner};
use crate::intake::controller::IntakeController;
use crate::storage::settings::{ProbeMode, ProviderMode};
use crate::store::backend::{JsonFileBackend, StorageBackend};
use crate::store::records::DeploymentStore;

/// Logged on records a previous run left pending or deploying
pub const INTERRUPTED_MESSAGE: &str = "Deployment interrupted by restart";

/// External collaborators, replaceable in tests
pub struct Collaborators {
    pub backend: Arc<dyn StorageBackend>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub provisioner: Arc<dyn Provisioner>,
    pub probe: Arc<dyn StatusProbe>,
}

impl Collaborators {
    /// Build the production collaborators described by `options`
    pub fn from_options(options: &AppOptions) -> Result<Self, BotError> {
        Ok(Self {
            backend: Arc::new(JsonFileBackend::new(options.layout.deployments_file())),
            verifier: Arc::new(HttpIdentityVerifier::new(
                &options.identity.base_url,
                options.identity.request_timeout,
            )?),
            provisioner: init_provisioner(&options.provider)?,
            probe: init_probe(&options.probe)?,
        })
    }
}

fn init_provisioner(options: &ProviderOptions) -> Result<Arc<dyn Provisioner>, BotError> {
    match (options.mode, &options.api_key) {
        (ProviderMode::Http, Some(api_key)) => {
            info!("Provisioning through {}", options.api_url);
            Ok(Arc::new(HttpProvisioner::new(
                &options.api_url,
                SecretString::from(api_key.expose_secret().to_string()),
                options.request_timeout,
            )?))
        }
        (ProviderMode::Http, None) => Err(BotError::ConfigError(
            "the http provider needs an api key".to_string(),
        )),
        (ProviderMode::Simulated, _) => {
            info!("Using the simulated provisioner");
            Ok(Arc::new(SimulatedProvisioner::default()))
        }
    }
}

fn init_probe(options: &ProbeOptions) -> Result<Arc<dyn StatusProbe>, BotError> {
    let probe: Arc<dyn StatusProbe> = match options.mode {
        ProbeMode::Http => Arc::new(HttpStatusProbe::new(options.request_timeout)?),
        ProbeMode::Elapsed => Arc::new(ElapsedStatusProbe::new(options.warmup)),
    };
    Ok(probe)
}

/// Main application state
pub struct AppState {
    pub store: Arc<DeploymentStore>,
    pub outbox: Arc<Outbox>,
    pub supervisor: Arc<Supervisor>,
    pub intake: Arc<IntakeController>,
    pub control: Arc<ControlService>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions, collaborators: Collaborators) -> Result<Self, BotError> {
        info!("Initializing application state...");

        let store = Arc::new(DeploymentStore::open(collaborators.backend, options.log_capacity).await?);
        for (owner, name) in store.fail_interrupted(INTERRUPTED_MESSAGE).await? {
            warn!(owner, name = %name, "Deployment was interrupted by a restart, marked failed");
        }
        let outbox = Arc::new(Outbox::new(options.outbox_capacity));

        let executor = Arc::new(Executor::new(
            store.clone(),
            collaborators.provisioner.clone(),
            outbox.clone(),
            options.executor.clone(),
        ));
        let supervisor = Arc::new(Supervisor::new(executor));

        let intake = Arc::new(IntakeController::new(
            store.clone(),
            collaborators.verifier,
            supervisor.clone(),
            options.intake.clone(),
        ));
        let control = Arc::new(ControlService::new(
            store.clone(),
            supervisor.clone(),
            collaborators.provisioner,
            collaborators.probe,
        ));
        let dispatcher = Arc::new(Dispatcher::new(intake.clone(), control.clone()));

        Ok(Self {
            store,
            outbox,
            supervisor,
            intake,
            control,
            dispatcher,
        })
    }

    /// Stop executor tasks and write a final snapshot
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), BotError> {
        info!("Shutting down application state...");

        if let Err(e) = self.supervisor.shutdown(timeout).await {
            error!("Executor tasks did not stop cleanly: {}", e);
        }
        self.store.persist().await
    }
}
