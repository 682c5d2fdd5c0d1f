//! Inbound event routing
//!
//! Maps chat events onto intake and control operations and renders the
//! replies. Slash commands other than `/done` are handled here even while an
//! intake session is open; everything else goes to the session.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::chat::command::{parse_button, parse_command, Button, Command};
use crate::chat::render;
use crate::chat::reply::Reply;
use crate::control::service::ControlService;
use crate::errors::BotError;
use crate::intake::controller::IntakeController;
use crate::models::deployment::OwnerId;
use crate::telemetry::collect_metrics;

/// An event received from the chat transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text { owner: OwnerId, text: String },
    File { owner: OwnerId, filename: String, bytes: Vec<u8> },
    Button { owner: OwnerId, data: String },
}

impl InboundEvent {
    pub fn owner(&self) -> OwnerId {
        match self {
            InboundEvent::Text { owner, .. }
            | InboundEvent::File { owner, .. }
            | InboundEvent::Button { owner, .. } => *owner,
        }
    }
}

/// Routes inbound events to the intake controller and control service
pub struct Dispatcher {
    intake: Arc<IntakeController>,
    control: Arc<ControlService>,
}

impl Dispatcher {
    pub fn new(intake: Arc<IntakeController>, control: Arc<ControlService>) -> Self {
        Self { intake, control }
    }

    /// Handle one event and return the immediate replies
    pub async fn handle(&self, event: InboundEvent) -> Vec<Reply> {
        let owner = event.owner();
        let result = match event {
            InboundEvent::Text { text, .. } => match parse_command(&text) {
                Some(command) => self.command(owner, command).await,
                None => self.intake.handle_text(owner, &text).await.map(|step| render::step(&step)),
            },
            InboundEvent::File { filename, bytes, .. } => self
                .intake
                .handle_file(owner, &filename, &bytes)
                .await
                .map(|step| render::step(&step)),
            InboundEvent::Button { data, .. } => match parse_button(&data) {
                Some(button) => self.button(owner, button).await,
                None => {
                    warn!(owner, data = %data, "Unknown button payload");
                    Ok(Reply::text("This button is no longer valid."))
                }
            },
        };

        match result {
            Ok(reply) => vec![reply],
            Err(e) => {
                debug!(owner, "Request failed: {}", e);
                vec![render::error(&e)]
            }
        }
    }

    async fn command(&self, owner: OwnerId, command: Command) -> Result<Reply, BotError> {
        match command {
            Command::Start => Ok(render::welcome(&self.control.stats().await)),
            Command::Help => Ok(render::help()),
            Command::Deploy => self.intake.start(owner).await.map(|step| render::step(&step)),
            Command::Cancel => Ok(render::step(&self.intake.cancel(owner).await)),
            Command::MyBots => Ok(render::deployment_list(&self.control.list(owner).await)),
            Command::Stats => self.stats().await,
            Command::Status(Some(name)) => self.status(owner, &name).await,
            Command::Logs(Some(name)) => self.logs(owner, &name).await,
            Command::Stop(Some(name)) => self.stop(owner, &name).await,
            Command::Restart(Some(name)) => self.restart(owner, &name).await,
            Command::Delete(Some(name)) => {
                // ask first, the button carries the confirmation
                self.control.find(owner, &name).await?;
                Ok(render::confirm_delete(&name))
            }
            Command::Status(None) => Ok(render::usage("status")),
            Command::Logs(None) => Ok(render::usage("logs")),
            Command::Stop(None) => Ok(render::usage("stop")),
            Command::Restart(None) => Ok(render::usage("restart")),
            Command::Delete(None) => Ok(render::usage("delete")),
            Command::Unknown(command) => Ok(Reply::text(format!(
                "Unknown command {}. Use /help to see what I can do.",
                command
            ))),
        }
    }

    async fn button(&self, owner: OwnerId, button: Button) -> Result<Reply, BotError> {
        match button {
            Button::DeployNew => self.intake.start(owner).await.map(|step| render::step(&step)),
            Button::MyBots | Button::RefreshMyBots => {
                Ok(render::deployment_list(&self.control.list(owner).await))
            }
            Button::Stats => self.stats().await,
            Button::Help => Ok(render::help()),
            Button::BotInfo(name) => self.status(owner, &name).await,
            Button::ViewLogs(name) => self.logs(owner, &name).await,
            Button::StopBot(name) => self.stop(owner, &name).await,
            Button::RestartBot(name) => self.restart(owner, &name).await,
            Button::DeleteBot(name) => {
                self.control.find(owner, &name).await?;
                Ok(render::confirm_delete(&name))
            }
            Button::ConfirmDelete(name) => {
                self.control.delete(owner, &name).await?;
                Ok(render::deleted(&name))
            }
        }
    }

    async fn status(&self, owner: OwnerId, name: &str) -> Result<Reply, BotError> {
        let deployment = self.control.get_status(owner, name).await?;
        Ok(render::status_card(&deployment))
    }

    async fn logs(&self, owner: OwnerId, name: &str) -> Result<Reply, BotError> {
        let entries = self.control.list_logs(owner, name, render::LOGS_LIMIT).await?;
        Ok(render::logs(name, &entries))
    }

    async fn stop(&self, owner: OwnerId, name: &str) -> Result<Reply, BotError> {
        let outcome = self.control.stop(owner, name).await?;
        Ok(render::stopped(name, &outcome))
    }

    async fn restart(&self, owner: OwnerId, name: &str) -> Result<Reply, BotError> {
        let outcome = self.control.restart(owner, name).await?;
        Ok(render::restarted(name, &outcome))
    }

    async fn stats(&self) -> Result<Reply, BotError> {
        let stats = self.control.stats().await;
        let process = tokio::task::spawn_blocking(collect_metrics)
            .await
            .map_err(|e| BotError::Internal(e.to_string()))?;
        Ok(render::stats(&stats, &process))
    }
}
