//! Deployment executor
//!
//! Runs the provisioning sequence for one confirmed deployment:
//! Prepare, Provision and Launch, strictly in order. Every step is recorded
//! through the store. The cancellation token is checked between phases and
//! raced against the provisioning call and the launch ticks, never against a
//! store write.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::command::Button;
use crate::chat::outbox::ReplySink;
use crate::chat::reply::Reply;
use crate::deploy::fsm::LifecycleEvent;
use crate::deploy::service::{resolve_entry_point, service_spec, HostingOptions};
use crate::errors::BotError;
use crate::http::provider::Provisioner;
use crate::intake::validate::Rejection;
use crate::models::deployment::{Deployment, OwnerId};
use crate::store::records::DeploymentStore;

/// Executor options
#[derive(Debug, Clone)]
pub struct Options {
    /// Number of launch progress ticks
    pub launch_ticks: u32,

    /// Delay before each launch tick
    pub tick_interval: Duration,

    pub hosting: HostingOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            launch_ticks: 5,
            tick_interval: Duration::from_secs(2),
            hosting: HostingOptions::default(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Launched,
    Failed(String),
    Cancelled,
    /// The record was deleted while the run was in flight
    Vanished,
}

enum Completion {
    Launched(Deployment),
    Cancelled,
}

/// Deployment executor
pub struct Executor {
    store: Arc<DeploymentStore>,
    provisioner: Arc<dyn Provisioner>,
    sink: Arc<dyn ReplySink>,
    options: Options,
}

impl Executor {
    pub fn new(
        store: Arc<DeploymentStore>,
        provisioner: Arc<dyn Provisioner>,
        sink: Arc<dyn ReplySink>,
        options: Options,
    ) -> Self {
        Self {
            store,
            provisioner,
            sink,
            options,
        }
    }

    /// Run every phase for `(owner, name)` and record the result
    pub async fn run<S, F>(&self, owner: OwnerId, name: &str, cancel: CancellationToken, sleep_fn: S) -> RunOutcome
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        info!(owner, name, "Executor starting");

        match self.execute(owner, name, &cancel, sleep_fn).await {
            Ok(Completion::Launched(deployment)) => {
                info!(owner, name, "Deployment launched");
                let mut reply = Reply::text(format!("✅ `{}` is live!", name))
                    .with_action("📋 Logs", Button::ViewLogs(name.to_string()).data());
                if let Some(url) = &deployment.url {
                    reply.text.push_str(&format!("\nURL: {}", url));
                }
                self.sink.push(owner, reply);
                RunOutcome::Launched
            }
            Ok(Completion::Cancelled) => self.record_cancelled(owner, name).await,
            Err(_) if cancel.is_cancelled() => self.record_cancelled(owner, name).await,
            Err(e) if e.is_not_found() => {
                info!(owner, name, "Deployment removed during execution");
                RunOutcome::Vanished
            }
            Err(e) => self.fail(owner, name, &e).await,
        }
    }

    async fn execute<S, F>(
        &self,
        owner: OwnerId,
        name: &str,
        cancel: &CancellationToken,
        sleep_fn: S,
    ) -> Result<Completion, BotError>
    where
        S: Fn(Duration) -> F,
        F: Future<Output = ()>,
    {
        if cancel.is_cancelled() {
            return Ok(Completion::Cancelled);
        }
        self.store
            .transition(owner, name, LifecycleEvent::Deploy, Some("Starting deployment process".to_string()))
            .await?;
        self.sink.push(owner, Reply::text(format!("🚀 Deploying `{}`...", name)));

        // Prepare
        let deployment = self.store.find(owner, name).await?;
        let entry_point = resolve_entry_point(&deployment).ok_or(Rejection::MissingEntryPoint)?;
        self.store
            .append_log(
                owner,
                name,
                format!(
                    "Files prepared successfully: {} files, {} dependencies, entry point {}",
                    deployment.files.len(),
                    deployment.deps.len(),
                    entry_point
                ),
            )
            .await?;
        debug!(owner, name, entry_point = %entry_point, "Prepare phase done");

        // Provision
        if cancel.is_cancelled() {
            return Ok(Completion::Cancelled);
        }
        let spec = service_spec(&deployment, &entry_point, &self.options.hosting);
        self.store
            .append_log(owner, name, format!("Creating service: {}", spec.name))
            .await?;
        let service = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Completion::Cancelled),
            result = self.provisioner.create_service(&spec) => result?,
        };
        self.store
            .set_endpoint(owner, name, service.url.clone(), service.provider_service_id.clone())
            .await?;
        self.store
            .append_log(owner, name, format!("Service created: {}", service.url))
            .await?;
        debug!(owner, name, service_id = %service.provider_service_id, "Provision phase done");
        self.sink.push(owner, Reply::text(format!("⚙️ Service for `{}` created, launching...", name)));

        // Launch
        let ticks = self.options.launch_ticks.max(1);
        for tick in 1..=ticks {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(Completion::Cancelled),
                _ = sleep_fn(self.options.tick_interval) => {}
            }
            self.store
                .append_log(owner, name, format!("Deployment progress: {}%", tick * 100 / ticks))
                .await?;
        }
        if cancel.is_cancelled() {
            return Ok(Completion::Cancelled);
        }

        let deployment = self
            .store
            .transition(
                owner,
                name,
                LifecycleEvent::Launched,
                Some("Deployment completed successfully!".to_string()),
            )
            .await?;
        Ok(Completion::Launched(deployment))
    }

    async fn record_cancelled(&self, owner: OwnerId, name: &str) -> RunOutcome {
        info!(owner, name, "Deployment cancelled");
        match self.store.append_log(owner, name, "Deployment cancelled").await {
            Ok(()) => RunOutcome::Cancelled,
            Err(e) if e.is_not_found() => RunOutcome::Vanished,
            Err(e) => {
                warn!(owner, name, "Failed to record cancellation: {}", e);
                RunOutcome::Cancelled
            }
        }
    }

    /// Mark the deployment failed with the error's text
    pub async fn fail(&self, owner: OwnerId, name: &str, err: &BotError) -> RunOutcome {
        error!(owner, name, "Deployment failed: {}", err);
        let message = format!("Deployment failed: {}", err);

        let recorded = self
            .store
            .transition(owner, name, LifecycleEvent::Fail, Some(message.clone()))
            .await;
        match recorded {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return RunOutcome::Vanished,
            Err(BotError::InvalidTransition(_)) => {
                // status was changed by the owner, keep it and only log
                if let Err(e) = self.store.append_log(owner, name, message.clone()).await {
                    warn!(owner, name, "Failed to record failure: {}", e);
                }
            }
            Err(e) => warn!(owner, name, "Failed to record failure: {}", e),
        }

        self.sink.push(
            owner,
            Reply::text(format!("❌ `{}` failed: {}", name, err))
                .with_action("📋 Logs", Button::ViewLogs(name.to_string()).data()),
        );
        RunOutcome::Failed(err.to_string())
    }
}
