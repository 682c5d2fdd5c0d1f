//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::{AppState, Collaborators};
use crate::errors::BotError;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the deployment bot with the production collaborators
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BotError> {
    let collaborators = Collaborators::from_options(&options)?;
    run_with(options, collaborators, shutdown_signal).await
}

/// Run the deployment bot until `shutdown_signal` resolves
pub async fn run_with(
    options: AppOptions,
    collaborators: Collaborators,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BotError> {
    info!("Initializing deploybot...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, collaborators, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start deploybot: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    collaborators: Collaborators,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), BotError> {
    let app_state = Arc::new(AppState::init(options, collaborators).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    if options.enable_server {
        init_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await?;
    }
    Ok(())
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BotError> {
    info!("Initializing HTTP server...");

    let mut server_state = ServerState::new(
        app_state.dispatcher.clone(),
        app_state.outbox.clone(),
        app_state.control.clone(),
        app_state.store.clone(),
    );
    if let Some(token) = &options.transport_token {
        server_state = server_state.with_transport_token(SecretString::from(token.expose_secret().to_string()));
    }

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), BotError>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), BotError> {
        if self.app_state.is_some() {
            return Err(BotError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_server_handle(&mut self, handle: JoinHandle<Result<(), BotError>>) -> Result<(), BotError> {
        if self.server_handle.is_some() {
            return Err(BotError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), BotError> {
        let _ = self.shutdown_tx.send(());

        let max_delay = self.lifecycle_options.max_shutdown_delay;
        match tokio::time::timeout(max_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!("Shutdown timed out after {:?}", max_delay);
                Err(BotError::ShutdownError(format!("timed out after {:?}", max_delay)))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), BotError> {
        info!("Shutting down deploybot...");

        // 1. Server, no new events after this
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| BotError::ShutdownError(e.to_string()))??;
        }

        // 2. Executor tasks and the final snapshot
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown(self.lifecycle_options.max_shutdown_delay / 2).await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
