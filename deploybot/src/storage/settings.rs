//! Settings file management

use std::collections::HashSet;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::deploy::executor;
use crate::deploy::service::HostingOptions;
use crate::errors::BotError;
use crate::filesys::file::File;
use crate::http::identity::DEFAULT_IDENTITY_BASE;
use crate::intake::controller;
use crate::logs::LogLevel;
use crate::models::deployment::OwnerId;
use crate::store::records::DEFAULT_LOG_CAPACITY;

/// Environment variable overriding the chat token
pub const CHAT_TOKEN_ENV: &str = "DEPLOYBOT_CHAT_TOKEN";

/// Environment variable overriding the provider API key
pub const PROVIDER_API_KEY_ENV: &str = "DEPLOYBOT_PROVIDER_API_KEY";

/// Bot settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily rolling log files
    #[serde(default = "default_true")]
    pub log_to_file: bool,

    #[serde(default)]
    pub chat: ChatSettings,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub intake: IntakeSettings,

    #[serde(default)]
    pub executor: ExecutorSettings,

    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub server: ServerSettings,

    /// Entries kept in each deployment log
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// Maximum delay for graceful shutdown in seconds
    #[serde(default = "default_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_shutdown_delay() -> u64 {
    30
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: true,
            chat: ChatSettings::default(),
            provider: ProviderSettings::default(),
            intake: IntakeSettings::default(),
            executor: ExecutorSettings::default(),
            probe: ProbeSettings::default(),
            server: ServerSettings::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            max_shutdown_delay_secs: default_shutdown_delay(),
        }
    }
}

impl Settings {
    /// Fill secrets from the environment where set
    pub fn apply_env(&mut self) {
        if let Some(token) = env_secret(CHAT_TOKEN_ENV) {
            self.chat.token = Some(token);
        }
        if let Some(key) = env_secret(PROVIDER_API_KEY_ENV) {
            self.provider.api_key = Some(key);
        }
    }

    /// Fail when a secret required by the selected components is missing
    pub fn require_secrets(&self) -> Result<(), BotError> {
        if self.chat.token.is_none() {
            return Err(BotError::ConfigError(format!(
                "chat token missing, set chat.token or {}",
                CHAT_TOKEN_ENV
            )));
        }
        if self.provider.mode == ProviderMode::Http && self.provider.api_key.is_none() {
            return Err(BotError::ConfigError(format!(
                "provider api key missing, set provider.api_key or {}",
                PROVIDER_API_KEY_ENV
            )));
        }
        Ok(())
    }

    pub fn intake_options(&self) -> controller::Options {
        controller::Options {
            allowed_owners: self.chat.allowed_owners.iter().copied().collect::<HashSet<OwnerId>>(),
            max_file_bytes: self.intake.max_file_bytes,
            max_files: self.intake.max_files,
        }
    }

    pub fn executor_options(&self) -> executor::Options {
        executor::Options {
            launch_ticks: self.executor.launch_ticks,
            tick_interval: Duration::from_millis(self.executor.tick_interval_ms),
            hosting: HostingOptions {
                region: self.provider.region.clone(),
                plan: self.provider.plan.clone(),
                ..HostingOptions::default()
            },
        }
    }
}

fn env_secret(key: &str) -> Option<SecretString> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(SecretString::from)
}

/// Load settings from `file`, falling back to defaults when it does not exist
pub async fn load_settings(file: &File) -> Result<Settings, BotError> {
    let mut settings = if file.exists().await {
        file.read_json::<Settings>()
            .await
            .map_err(|e| BotError::ConfigError(format!("{}: {}", file.path().display(), e)))?
    } else {
        info!("No settings file at {}, using defaults", file.path().display());
        Settings::default()
    };
    settings.apply_env();
    Ok(settings)
}

/// Chat front end settings
#[derive(Debug, Deserialize)]
pub struct ChatSettings {
    /// Token of the orchestrator's own chat bot
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,

    /// Base URL of the chat network API used for token checks
    #[serde(default = "default_identity_base")]
    pub identity_base_url: String,

    /// Owners allowed to deploy, empty allows everyone
    #[serde(default)]
    pub allowed_owners: Vec<OwnerId>,

    /// Queued replies kept per owner
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Timeout for external requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_identity_base() -> String {
    DEFAULT_IDENTITY_BASE.to_string()
}

fn default_outbox_capacity() -> usize {
    crate::chat::outbox::DEFAULT_OUTBOX_CAPACITY
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            token: None,
            identity_base_url: default_identity_base(),
            allowed_owners: Vec::new(),
            outbox_capacity: default_outbox_capacity(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Which provisioner to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    #[default]
    Simulated,
    Http,
}

/// Hosting provider settings
#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub mode: ProviderMode,

    #[serde(default = "default_provider_url")]
    pub api_url: String,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_plan")]
    pub plan: String,
}

fn default_provider_url() -> String {
    "https://api.render.com/v1".to_string()
}

fn default_region() -> String {
    "oregon".to_string()
}

fn default_plan() -> String {
    "free".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Simulated,
            api_url: default_provider_url(),
            api_key: None,
            region: default_region(),
            plan: default_plan(),
        }
    }
}

/// Upload limits
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeSettings {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_file_bytes() -> usize {
    1024 * 1024
}

fn default_max_files() -> usize {
    20
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_files: default_max_files(),
        }
    }
}

/// Launch phase pacing
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_launch_ticks")]
    pub launch_ticks: u32,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_launch_ticks() -> u32 {
    5
}

fn default_tick_interval() -> u64 {
    2000
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            launch_ticks: default_launch_ticks(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// How `get_status` decides whether a service is reachable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// Reachable once the warm-up period has passed
    #[default]
    Elapsed,
    /// GET the public URL
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    #[serde(default)]
    pub mode: ProbeMode,

    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,
}

fn default_warmup() -> u64 {
    30
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            mode: ProbeMode::Elapsed,
            warmup_secs: default_warmup(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
