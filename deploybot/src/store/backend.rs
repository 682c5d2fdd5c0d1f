//! Durable storage backends for the deployment store

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::BotError;
use crate::filesys::file::File;

/// Blob storage holding the full store snapshot
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Load the last written snapshot, `None` if nothing was written yet
    async fn load(&self) -> Result<Option<Vec<u8>>, BotError>;

    /// Replace the stored snapshot
    async fn save(&self, snapshot: &[u8]) -> Result<(), BotError>;
}

/// JSON file backend, rewritten atomically on every save
pub struct JsonFileBackend {
    file: File,
}

impl JsonFileBackend {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, BotError> {
        self.file.read_bytes_opt().await
    }

    async fn save(&self, snapshot: &[u8]) -> Result<(), BotError> {
        self.file
            .write_atomic(snapshot)
            .await
            .map_err(|e| BotError::Persistence(format!("{}: {}", self.file.path().display(), e)))?;
        debug!("Snapshot written to {}", self.file.path().display());
        Ok(())
    }
}

/// In-memory backend
#[derive(Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Last saved snapshot
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.blob.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Vec<u8>>, BotError> {
        Ok(self.snapshot())
    }

    async fn save(&self, snapshot: &[u8]) -> Result<(), BotError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BotError::Persistence("memory backend rejected write".to_string()));
        }
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
