//! Error types for the deployment bot

use thiserror::Error;

use crate::intake::validate::Rejection;

/// Main error type for the deployment bot
#[derive(Error, Debug)]
pub enum BotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{0}")]
    Validation(#[from] Rejection),

    #[error("Deployment `{name}` not found")]
    NotFound { owner: i64, name: String },

    #[error("Name `{0}` is already in use")]
    NameConflict(String),

    #[error("External call failed: {0}")]
    ExternalCall(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    pub fn not_found(owner: i64, name: impl Into<String>) -> Self {
        BotError::NotFound {
            owner,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BotError::NotFound { .. })
    }
}
