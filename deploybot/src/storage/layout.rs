//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::BotError;
use crate::filesys::file::File;

/// Default storage base directory
pub const DEFAULT_BASE_DIR: &str = "./data";

/// Storage layout for the bot
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the deployments database path
    pub fn deployments_file(&self) -> File {
        File::new(self.base_dir.join("deployments.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), BotError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        tokio::fs::create_dir_all(self.logs_dir()).await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}
