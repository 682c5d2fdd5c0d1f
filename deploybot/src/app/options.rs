//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::chat::outbox::DEFAULT_OUTBOX_CAPACITY;
use crate::deploy::executor;
use crate::http::identity::DEFAULT_IDENTITY_BASE;
use crate::intake::controller;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{ProbeMode, ProviderMode, Settings};
use crate::store::records::DEFAULT_LOG_CAPACITY;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Entries kept in each deployment log
    pub log_capacity: usize,

    /// Queued replies kept per owner
    pub outbox_capacity: usize,

    /// Enable the HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Token the transport presents on the event endpoints
    pub transport_token: Option<SecretString>,

    pub identity: IdentityOptions,

    pub provider: ProviderOptions,

    pub probe: ProbeOptions,

    pub intake: controller::Options,

    pub executor: executor::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            enable_server: true,
            server: ServerOptions::default(),
            transport_token: None,
            identity: IdentityOptions::default(),
            provider: ProviderOptions::default(),
            probe: ProbeOptions::default(),
            intake: controller::Options::default(),
            executor: executor::Options::default(),
        }
    }
}

impl AppOptions {
    /// Build the runtime options from loaded settings
    pub fn from_settings(settings: Settings, layout: StorageLayout) -> Self {
        let request_timeout = Duration::from_secs(settings.chat.request_timeout_secs);
        let intake = settings.intake_options();
        let executor = settings.executor_options();

        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
            },
            layout,
            log_capacity: settings.log_capacity,
            outbox_capacity: settings.chat.outbox_capacity,
            enable_server: true,
            server: ServerOptions {
                host: settings.server.host,
                port: settings.server.port,
            },
            transport_token: settings.chat.token,
            identity: IdentityOptions {
                base_url: settings.chat.identity_base_url,
                request_timeout,
            },
            provider: ProviderOptions {
                mode: settings.provider.mode,
                api_url: settings.provider.api_url,
                api_key: settings.provider.api_key,
                request_timeout,
            },
            probe: ProbeOptions {
                mode: settings.probe.mode,
                warmup: Duration::from_secs(settings.probe.warmup_secs),
                request_timeout,
            },
            intake,
            executor,
        }
    }
}

/// Lifecycle options for the bot
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Token identity check options
#[derive(Debug, Clone)]
pub struct IdentityOptions {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for IdentityOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_IDENTITY_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Provisioning options
#[derive(Debug)]
pub struct ProviderOptions {
    pub mode: ProviderMode,
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub request_timeout: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Simulated,
            api_url: "https://api.render.com/v1".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Reachability probe options
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub mode: ProbeMode,
    pub warmup: Duration,
    pub request_timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            mode: ProbeMode::Elapsed,
            warmup: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}
