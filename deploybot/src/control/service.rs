//! Status and control operations over existing deployments

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::deploy::fsm::{DeploymentStatus, LifecycleEvent};
use crate::deploy::supervisor::Supervisor;
use crate::errors::BotError;
use crate::http::probe::StatusProbe;
use crate::http::provider::Provisioner;
use crate::models::deployment::{Deployment, LogEntry, OwnerId};
use crate::store::records::{DeploymentStore, StoreSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(Deployment),
    AlreadyStopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted(Deployment),
    AlreadyRunning,
}

/// Aggregate statistics
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    #[serde(flatten)]
    pub summary: StoreSummary,
    pub active_tasks: usize,
    pub uptime_secs: u64,
}

/// Status and control API
pub struct ControlService {
    store: Arc<DeploymentStore>,
    supervisor: Arc<Supervisor>,
    provisioner: Arc<dyn Provisioner>,
    probe: Arc<dyn StatusProbe>,
    started_at: Instant,
}

impl ControlService {
    pub fn new(
        store: Arc<DeploymentStore>,
        supervisor: Arc<Supervisor>,
        provisioner: Arc<dyn Provisioner>,
        probe: Arc<dyn StatusProbe>,
    ) -> Self {
        Self {
            store,
            supervisor,
            provisioner,
            probe,
            started_at: Instant::now(),
        }
    }

    /// Current status. A deploying record with a service URL and no executor
    /// task is promoted to running once the reachability check passes.
    pub async fn get_status(&self, owner: OwnerId, name: &str) -> Result<Deployment, BotError> {
        let deployment = self.store.find(owner, name).await?;

        // only a provisioned record that no task owns can be promoted
        let probe_applies = deployment.status == DeploymentStatus::Deploying
            && deployment.url.is_some()
            && !self.supervisor.is_active(owner, name);
        if !probe_applies || !self.probe.is_reachable(&deployment).await {
            return Ok(deployment);
        }

        debug!(owner, name, "Probe reports service reachable");
        match self
            .store
            .transition(owner, name, LifecycleEvent::Reachable, Some("Service is reachable".to_string()))
            .await
        {
            Ok(deployment) => Ok(deployment),
            // changed concurrently, report what is stored now
            Err(BotError::InvalidTransition(_)) => self.store.find(owner, name).await,
            Err(e) => Err(e),
        }
    }

    /// The stored record, without probing
    pub async fn find(&self, owner: OwnerId, name: &str) -> Result<Deployment, BotError> {
        self.store.find(owner, name).await
    }

    /// The last `limit` log entries, oldest first
    pub async fn list_logs(&self, owner: OwnerId, name: &str, limit: usize) -> Result<Vec<LogEntry>, BotError> {
        Ok(self.store.find(owner, name).await?.recent_logs(limit))
    }

    pub async fn stop(&self, owner: OwnerId, name: &str) -> Result<StopOutcome, BotError> {
        let current = self.store.find(owner, name).await?;
        if current.status == DeploymentStatus::Stopped {
            return Ok(StopOutcome::AlreadyStopped);
        }

        if self.supervisor.cancel(owner, name) {
            info!(owner, name, "Cancelled in-flight deployment");
        }
        match self
            .store
            .transition(owner, name, LifecycleEvent::Stop, Some("Stopped by owner".to_string()))
            .await
        {
            Ok(deployment) => {
                info!(owner, name, "Deployment stopped");
                Ok(StopOutcome::Stopped(deployment))
            }
            Err(BotError::InvalidTransition(_)) => Ok(StopOutcome::AlreadyStopped),
            Err(e) => Err(e),
        }
    }

    /// Mark the deployment running again. Provisioning is not repeated.
    pub async fn restart(&self, owner: OwnerId, name: &str) -> Result<RestartOutcome, BotError> {
        match self
            .store
            .transition(owner, name, LifecycleEvent::Restart, Some("Restarted by owner".to_string()))
            .await
        {
            Ok(deployment) => {
                info!(owner, name, "Deployment restarted");
                Ok(RestartOutcome::Restarted(deployment))
            }
            Err(BotError::InvalidTransition(_)) => Ok(RestartOutcome::AlreadyRunning),
            Err(e) => Err(e),
        }
    }

    /// Remove the deployment permanently and tear down its service
    pub async fn delete(&self, owner: OwnerId, name: &str) -> Result<Deployment, BotError> {
        self.supervisor.cancel(owner, name);
        let removed = self.store.delete(owner, name).await?;

        if let Some(service_id) = &removed.provider_service_id {
            match self.provisioner.delete_service(service_id).await {
                Ok(()) => debug!(owner, name, "Service {} torn down", service_id),
                Err(e) => warn!(owner, name, "Failed to tear down service {}: {}", service_id, e),
            }
        }

        info!(owner, name, "Deployment deleted");
        Ok(removed)
    }

    pub async fn list(&self, owner: OwnerId) -> Vec<Deployment> {
        self.store.list(owner).await
    }

    pub async fn stats(&self) -> Stats {
        Stats {
            summary: self.store.summary().await,
            active_tasks: self.supervisor.active_count(),
            uptime_secs: self.uptime().as_secs(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
