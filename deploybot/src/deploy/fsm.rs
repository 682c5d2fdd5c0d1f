//! Lifecycle state machine for deployment records

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::BotError;

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Record created, executor not started yet
    Pending,

    /// Executor is working through its phases
    Deploying,

    /// Service launched
    Running,

    /// Deployment failed
    Failed,

    /// Stopped by the owner
    Stopped,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 5] = [
        DeploymentStatus::Pending,
        DeploymentStatus::Deploying,
        DeploymentStatus::Running,
        DeploymentStatus::Failed,
        DeploymentStatus::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Executor picked the record up
    Deploy,

    /// All launch ticks completed
    Launched,

    /// A phase failed
    Fail,

    /// Owner stopped the service
    Stop,

    /// Owner restarted the service
    Restart,

    /// Reachability probe saw the service answering
    Reachable,
}

/// Compute the status reached from `status` on `event`.
pub fn transition(status: DeploymentStatus, event: &LifecycleEvent) -> Result<DeploymentStatus, BotError> {
    use DeploymentStatus as S;

    let next = match (status, event) {
        // From Pending
        (S::Pending, LifecycleEvent::Deploy) => S::Deploying,

        // From Deploying
        (S::Deploying, LifecycleEvent::Launched) => S::Running,
        (S::Deploying, LifecycleEvent::Reachable) => S::Running,

        // Restarted by the owner while the executor was still launching
        (S::Running, LifecycleEvent::Launched) => S::Running,

        (S::Pending | S::Deploying, LifecycleEvent::Fail) => S::Failed,

        // Owner commands
        (S::Stopped, LifecycleEvent::Stop) => {
            return Err(BotError::InvalidTransition("already stopped".to_string()));
        }
        (_, LifecycleEvent::Stop) => S::Stopped,
        (S::Running, LifecycleEvent::Restart) => {
            return Err(BotError::InvalidTransition("already running".to_string()));
        }
        (_, LifecycleEvent::Restart) => S::Running,

        // Invalid transitions
        (status, event) => {
            return Err(BotError::InvalidTransition(format!(
                "{:?} -> {:?}",
                status, event
            )));
        }
    };

    Ok(next)
}
