//! Supervisor owning the running executor tasks

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::deploy::executor::Executor;
use crate::errors::BotError;
use crate::models::deployment::OwnerId;

type TaskKey = (OwnerId, String);

struct TaskHandle {
    id: u64,
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

type TaskMap = Arc<Mutex<HashMap<TaskKey, TaskHandle>>>;

/// Starts one executor task per deployment and holds its cancellation token
pub struct Supervisor {
    executor: Arc<Executor>,
    tasks: TaskMap,
    next_id: AtomicU64,
}

impl Supervisor {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start the executor for `(owner, name)`, replacing any previous task
    pub fn spawn(&self, owner: OwnerId, name: &str) {
        let key: TaskKey = (owner, name.to_string());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        let executor = self.executor.clone();
        let tasks = self.tasks.clone();
        let task_token = token.clone();
        let task_key = key.clone();

        let mut map = lock(&self.tasks);
        if let Some(previous) = map.remove(&key) {
            warn!(owner, name, "Replacing running executor task");
            previous.token.cancel();
        }

        tokio::spawn(async move {
            let (owner, name) = task_key.clone();
            let run = executor.run(owner, &name, task_token, tokio::time::sleep);
            let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    error!(owner, name = %name, "Executor task panicked: {}", reason);
                    executor
                        .fail(owner, &name, &BotError::Internal(format!("executor panicked: {}", reason)))
                        .await
                }
            };
            info!(owner, name = %name, "Executor finished: {:?}", outcome);

            let mut map = lock(&tasks);
            if map.get(&task_key).is_some_and(|handle| handle.id == id) {
                map.remove(&task_key);
            }
            drop(map);
            let _ = done_tx.send(true);
        });

        map.insert(
            key,
            TaskHandle {
                id,
                token,
                done: done_rx,
            },
        );
    }

    /// Whether an executor task is running for `(owner, name)`
    pub fn is_active(&self, owner: OwnerId, name: &str) -> bool {
        lock(&self.tasks).contains_key(&(owner, name.to_string()))
    }

    pub fn active_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Cancel the task for `(owner, name)`. Returns whether one was running.
    pub fn cancel(&self, owner: OwnerId, name: &str) -> bool {
        match lock(&self.tasks).get(&(owner, name.to_string())) {
            Some(handle) => {
                handle.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let map = lock(&self.tasks);
        if !map.is_empty() {
            info!("Cancelling {} executor tasks", map.len());
        }
        for handle in map.values() {
            handle.token.cancel();
        }
    }

    /// Wait until the task for `(owner, name)` has finished
    pub async fn wait(&self, owner: OwnerId, name: &str) {
        let done = lock(&self.tasks)
            .get(&(owner, name.to_string()))
            .map(|handle| handle.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Cancel every task and wait up to `timeout` for them to finish
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), BotError> {
        self.cancel_all();
        let pending: Vec<watch::Receiver<bool>> = lock(&self.tasks)
            .values()
            .map(|handle| handle.done.clone())
            .collect();

        let all_done = futures::future::join_all(pending.into_iter().map(|mut done| async move {
            let _ = done.wait_for(|finished| *finished).await;
        }));

        tokio::time::timeout(timeout, all_done)
            .await
            .map_err(|_| BotError::ShutdownError("executor tasks did not finish in time".to_string()))?;
        Ok(())
    }
}

fn lock(tasks: &TaskMap) -> std::sync::MutexGuard<'_, HashMap<TaskKey, TaskHandle>> {
    tasks.lock().unwrap_or_else(|e| e.into_inner())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("active", &self.active_count())
            .finish()
    }
}
