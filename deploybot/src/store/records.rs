//! Deployment record store
//!
//! Holds every deployment in memory, grouped by owner in creation order, and
//! rewrites the full collection to the storage backend after each mutation.
//! Mutations are serialized behind one writer lock that is held until the
//! snapshot is written, so concurrent executor tasks and owner commands never
//! interleave on a record or overwrite each other's snapshot. A mutation whose
//! snapshot cannot be written is rolled back, keeping memory equal to the last
//! durable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::deploy::fsm::{transition, DeploymentStatus, LifecycleEvent};
use crate::errors::BotError;
use crate::models::deployment::{Deployment, LogEntry, NewDeployment, OwnerId};
use crate::store::backend::StorageBackend;

/// Owner -> deployments in creation order
pub type Registry = BTreeMap<OwnerId, Vec<Deployment>>;

/// Default log capacity per deployment
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Aggregate counts for health and stats probes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub total_owners: usize,
    pub total_deployments: usize,
    pub by_status: BTreeMap<DeploymentStatus, usize>,
}

impl StoreSummary {
    pub fn count(&self, status: DeploymentStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Deployment record store
pub struct DeploymentStore {
    records: RwLock<Registry>,
    backend: Arc<dyn StorageBackend>,
    persist_lock: Mutex<()>,
    log_capacity: usize,
}

impl DeploymentStore {
    /// Open the store, loading whatever the backend holds
    pub async fn open(backend: Arc<dyn StorageBackend>, log_capacity: usize) -> Result<Self, BotError> {
        let store = Self {
            records: RwLock::new(Registry::new()),
            backend,
            persist_lock: Mutex::new(()),
            log_capacity: log_capacity.max(1),
        };
        store.load().await?;
        Ok(store)
    }

    /// Replace the in-memory collection with the backend's snapshot
    pub async fn load(&self) -> Result<(), BotError> {
        let mut registry: Registry = match self.backend.load().await? {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            _ => Registry::new(),
        };

        for deployments in registry.values_mut() {
            for deployment in deployments.iter_mut() {
                deployment.trim_log(self.log_capacity);
            }
        }
        registry.retain(|_, deployments| !deployments.is_empty());

        let owners = registry.len();
        let total: usize = registry.values().map(Vec::len).sum();
        *self.records.write().await = registry;

        info!("Loaded {} deployments for {} owners", total, owners);
        Ok(())
    }

    /// Write the full collection to the backend
    pub async fn persist(&self) -> Result<(), BotError> {
        let records = self.records.read().await;
        self.write_snapshot(&records).await
    }

    async fn write_snapshot(&self, registry: &Registry) -> Result<(), BotError> {
        let snapshot = serde_json::to_vec_pretty(registry)?;
        let _guard = self.persist_lock.lock().await;
        match self.backend.save(&snapshot).await {
            Ok(()) => {
                debug!("Deployments saved ({} bytes)", snapshot.len());
                Ok(())
            }
            Err(e) => {
                error!("Failed to save deployments: {}", e);
                Err(match e {
                    BotError::Persistence(msg) => BotError::Persistence(msg),
                    other => BotError::Persistence(other.to_string()),
                })
            }
        }
    }

    /// Create a pending deployment. Names are unique across all owners.
    pub async fn create(&self, owner: OwnerId, new: NewDeployment) -> Result<Deployment, BotError> {
        let mut records = self.records.write().await;
        if name_in_use(&records, &new.name) {
            return Err(BotError::NameConflict(new.name));
        }

        let deployment = Deployment::new(owner, new);
        records.entry(owner).or_default().push(deployment.clone());

        if let Err(e) = self.write_snapshot(&records).await {
            if let Some(deployments) = records.get_mut(&owner) {
                deployments.pop();
                if deployments.is_empty() {
                    records.remove(&owner);
                }
            }
            return Err(e);
        }

        info!(owner, name = %deployment.name, "Deployment record created");
        Ok(deployment)
    }

    /// Check whether any owner already uses `name`
    pub async fn name_taken(&self, name: &str) -> bool {
        name_in_use(&*self.records.read().await, name)
    }

    pub async fn find(&self, owner: OwnerId, name: &str) -> Result<Deployment, BotError> {
        self.records
            .read()
            .await
            .get(&owner)
            .and_then(|deployments| deployments.iter().find(|d| d.name == name))
            .cloned()
            .ok_or_else(|| BotError::not_found(owner, name))
    }

    /// The owner's deployments in creation order
    pub async fn list(&self, owner: OwnerId) -> Vec<Deployment> {
        self.records
            .read()
            .await
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Every deployment, grouped by owner
    pub async fn all(&self) -> Vec<Deployment> {
        self.records
            .read()
            .await
            .values()
            .flat_map(|deployments| deployments.iter().cloned())
            .collect()
    }

    pub async fn summary(&self) -> StoreSummary {
        let records = self.records.read().await;
        let mut summary = StoreSummary {
            total_owners: records.len(),
            ..Default::default()
        };
        for deployment in records.values().flatten() {
            summary.total_deployments += 1;
            *summary.by_status.entry(deployment.status).or_insert(0) += 1;
        }
        summary
    }

    /// Mutate one record and persist. Nothing is written when `mutate` fails.
    pub async fn update<T, F>(&self, owner: OwnerId, name: &str, mutate: F) -> Result<T, BotError>
    where
        F: FnOnce(&mut Deployment) -> Result<T, BotError>,
    {
        let mut records = self.records.write().await;
        let deployment = record_mut(&mut records, owner, name)
            .ok_or_else(|| BotError::not_found(owner, name))?;

        let previous = deployment.clone();
        let value = match mutate(deployment) {
            Ok(value) => value,
            Err(e) => {
                *deployment = previous;
                return Err(e);
            }
        };

        if let Err(e) = self.write_snapshot(&records).await {
            if let Some(deployment) = record_mut(&mut records, owner, name) {
                *deployment = previous;
            }
            return Err(e);
        }
        Ok(value)
    }

    /// Timestamp and append a log entry
    pub async fn append_log(&self, owner: OwnerId, name: &str, text: impl Into<String>) -> Result<(), BotError> {
        let capacity = self.log_capacity;
        let entry = LogEntry::now(text);
        self.update(owner, name, move |deployment| {
            deployment.push_log(entry, capacity);
            Ok(())
        })
        .await
    }

    pub async fn set_status(&self, owner: OwnerId, name: &str, status: DeploymentStatus) -> Result<Deployment, BotError> {
        self.update(owner, name, |deployment| {
            deployment.status = status;
            deployment.touch();
            Ok(deployment.clone())
        })
        .await
    }

    /// Apply a lifecycle event, optionally logging in the same write
    pub async fn transition(
        &self,
        owner: OwnerId,
        name: &str,
        event: LifecycleEvent,
        message: Option<String>,
    ) -> Result<Deployment, BotError> {
        let capacity = self.log_capacity;
        self.update(owner, name, move |deployment| {
            let next = transition(deployment.status, &event)?;
            debug!(name = %deployment.name, from = %deployment.status, to = %next, "Status transition");
            deployment.status = next;
            deployment.touch();
            if let Some(message) = message {
                deployment.push_log(LogEntry::now(message), capacity);
            }
            Ok(deployment.clone())
        })
        .await
    }

    /// Record the provider's references for a deployment
    pub async fn set_endpoint(
        &self,
        owner: OwnerId,
        name: &str,
        url: String,
        provider_service_id: String,
    ) -> Result<Deployment, BotError> {
        self.update(owner, name, move |deployment| {
            deployment.url = Some(url);
            deployment.provider_service_id = Some(provider_service_id);
            deployment.touch();
            Ok(deployment.clone())
        })
        .await
    }

    /// Fail every record left pending or deploying by a previous run, logging
    /// `message` on each. All of them are written in one snapshot.
    pub async fn fail_interrupted(&self, message: &str) -> Result<Vec<(OwnerId, String)>, BotError> {
        let mut records = self.records.write().await;
        let previous = records.clone();

        let mut failed = Vec::new();
        for deployment in records.values_mut().flatten() {
            if !matches!(deployment.status, DeploymentStatus::Pending | DeploymentStatus::Deploying) {
                continue;
            }
            deployment.status = transition(deployment.status, &LifecycleEvent::Fail)?;
            deployment.touch();
            deployment.push_log(LogEntry::now(message), self.log_capacity);
            failed.push((deployment.owner, deployment.name.clone()));
        }
        if failed.is_empty() {
            return Ok(failed);
        }

        if let Err(e) = self.write_snapshot(&records).await {
            *records = previous;
            return Err(e);
        }
        Ok(failed)
    }

    /// Remove a record permanently
    pub async fn delete(&self, owner: OwnerId, name: &str) -> Result<Deployment, BotError> {
        let mut records = self.records.write().await;
        let deployments = records
            .get_mut(&owner)
            .ok_or_else(|| BotError::not_found(owner, name))?;
        let index = deployments
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| BotError::not_found(owner, name))?;

        let removed = deployments.remove(index);
        if deployments.is_empty() {
            records.remove(&owner);
        }

        if let Err(e) = self.write_snapshot(&records).await {
            let deployments = records.entry(owner).or_default();
            deployments.insert(index.min(deployments.len()), removed);
            return Err(e);
        }

        info!(owner, name, "Deployment record deleted");
        Ok(removed)
    }
}

fn record_mut<'a>(registry: &'a mut Registry, owner: OwnerId, name: &str) -> Option<&'a mut Deployment> {
    registry
        .get_mut(&owner)
        .and_then(|deployments| deployments.iter_mut().find(|d| d.name == name))
}

fn name_in_use(registry: &Registry, name: &str) -> bool {
    registry.values().flatten().any(|d| d.name == name)
}
