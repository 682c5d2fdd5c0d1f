//! Asynchronous reply delivery

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::chat::reply::Reply;
use crate::models::deployment::OwnerId;

/// Default number of queued replies per owner
pub const DEFAULT_OUTBOX_CAPACITY: usize = 50;

/// Destination for replies produced outside a request
pub trait ReplySink: Send + Sync {
    fn push(&self, owner: OwnerId, reply: Reply);
}

/// Bounded per-owner reply queue drained by the transport
pub struct Outbox {
    queues: Mutex<HashMap<OwnerId, VecDeque<Reply>>>,
    capacity: usize,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Take every queued reply for `owner`, oldest first
    pub fn drain(&self, owner: OwnerId) -> Vec<Reply> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .remove(&owner)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Number of queued replies for `owner`
    pub fn pending(&self, owner: OwnerId) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get(&owner).map(VecDeque::len).unwrap_or(0)
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl ReplySink for Outbox {
    fn push(&self, owner: OwnerId, reply: Reply) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        let queue = queues.entry(owner).or_default();
        if queue.len() >= self.capacity {
            warn!(owner, "Outbox full, dropping oldest reply");
            queue.pop_front();
        }
        debug!(owner, "Reply queued");
        queue.push_back(reply);
    }
}
