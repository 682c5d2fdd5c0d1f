//! Deployment models

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;

/// Chat user identifier owning a deployment
pub type OwnerId = i64;

/// A timestamped deployment log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Fields collected by the intake conversation
#[derive(Clone, PartialEq, Eq)]
pub struct NewDeployment {
    pub name: String,
    pub token: String,
    pub files: BTreeMap<String, String>,
    pub deps: Vec<String>,
    pub entry_point: Option<String>,
}

impl fmt::Debug for NewDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewDeployment")
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("deps", &self.deps)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

/// A tracked deployment record
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Owner user ID
    pub owner: OwnerId,

    /// Globally unique name, also used as the service name
    pub name: String,

    /// Bot token handed to the deployed service
    pub token: String,

    /// Uploaded files, filename -> content
    #[serde(default)]
    pub files: BTreeMap<String, String>,

    /// Package names from the dependency manifest
    #[serde(default)]
    pub deps: Vec<String>,

    /// Designated entry point
    #[serde(default)]
    pub entry_point: Option<String>,

    pub status: DeploymentStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Bounded log, oldest first
    #[serde(default)]
    pub log: VecDeque<LogEntry>,

    #[serde(default)]
    pub provider_service_id: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}

impl Deployment {
    /// Create a pending deployment for `owner`
    pub fn new(owner: OwnerId, new: NewDeployment) -> Self {
        let now = Utc::now();
        Self {
            owner,
            name: new.name,
            token: new.token,
            files: new.files,
            deps: new.deps,
            entry_point: new.entry_point,
            status: DeploymentStatus::Pending,
            created_at: now,
            updated_at: now,
            log: VecDeque::new(),
            provider_service_id: None,
            url: None,
        }
    }

    /// Append a log entry, evicting the oldest ones beyond `capacity`
    pub fn push_log(&mut self, entry: LogEntry, capacity: usize) {
        self.updated_at = entry.at;
        self.log.push_back(entry);
        self.trim_log(capacity);
    }

    pub fn trim_log(&mut self, capacity: usize) {
        while self.log.len() > capacity {
            self.log.pop_front();
        }
    }

    /// The last `limit` log entries, oldest first
    pub fn recent_logs(&self, limit: usize) -> Vec<LogEntry> {
        let skip = self.log.len().saturating_sub(limit);
        self.log.iter().skip(skip).cloned().collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("deps", &self.deps)
            .field("entry_point", &self.entry_point)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("log_len", &self.log.len())
            .field("provider_service_id", &self.provider_service_id)
            .field("url", &self.url)
            .finish()
    }
}
