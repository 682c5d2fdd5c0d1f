//! Intake conversation controller
//!
//! Walks an owner through name, token, files and confirmation. Each owner's
//! session sits in its own async mutex slot, so one owner's events are handled
//! one at a time (the identity check included) while other owners proceed
//! independently.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::deploy::supervisor::Supervisor;
use crate::errors::BotError;
use crate::http::identity::{BotIdentity, IdentityVerifier};
use crate::intake::session::{Draft, DraftSummary, Session, Stage};
use crate::intake::validate::{
    check_filename, check_name, check_token_shape, decode_text, has_chat_framework, is_entry_point,
    looks_like_bot, parse_manifest, Rejection, MANIFEST,
};
use crate::models::deployment::{Deployment, OwnerId};
use crate::store::records::DeploymentStore;

/// Confirmation phrase
pub const CONFIRM: &str = "CONFIRM";

/// Intake options
#[derive(Debug, Clone)]
pub struct Options {
    /// Owners allowed to deploy, empty allows everyone
    pub allowed_owners: HashSet<OwnerId>,

    /// Maximum size of one uploaded file
    pub max_file_bytes: usize,

    /// Maximum number of distinct files per session
    pub max_files: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            allowed_owners: HashSet::new(),
            max_file_bytes: 1024 * 1024,
            max_files: 20,
        }
    }
}

/// Non-blocking advisories attached to an accepted file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// Entry point mentions neither `Application` nor `Updater`
    EntryPointNotABot,
    /// Manifest does not list the chat framework
    MissingChatFramework,
}

/// Result of one intake event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Started { replaced_previous: bool },
    NameAccepted { name: String },
    TokenAccepted { bot: BotIdentity },
    FileAccepted {
        filename: String,
        entry_point: Option<String>,
        files: usize,
        deps: usize,
        warnings: Vec<Warning>,
    },
    ReadyToConfirm(DraftSummary),
    Deployed(Deployment),
    Cancelled { had_session: bool },
    /// Input with no effect in the current stage
    Ignored(Stage),
    NoSession,
}

type Slot = Arc<AsyncMutex<Option<Session>>>;

/// Intake conversation controller
pub struct IntakeController {
    sessions: Mutex<HashMap<OwnerId, Slot>>,
    store: Arc<DeploymentStore>,
    verifier: Arc<dyn IdentityVerifier>,
    supervisor: Arc<Supervisor>,
    options: Options,
}

impl IntakeController {
    pub fn new(
        store: Arc<DeploymentStore>,
        verifier: Arc<dyn IdentityVerifier>,
        supervisor: Arc<Supervisor>,
        options: Options,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            verifier,
            supervisor,
            options,
        }
    }

    fn slot(&self, owner: OwnerId) -> Slot {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.entry(owner).or_default().clone()
    }

    /// Drop the owner's slot once it holds no session and no other caller
    /// holds a handle to it. Clones are only handed out under the map lock.
    fn release(&self, owner: OwnerId, slot: &Slot) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let idle = sessions.get(&owner).is_some_and(|current| {
            Arc::ptr_eq(current, slot)
                && Arc::strong_count(slot) == 2
                && slot.try_lock().is_ok_and(|session| session.is_none())
        });
        if idle {
            sessions.remove(&owner);
        }
    }

    /// Number of owners with a session slot
    pub fn open_slots(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether `owner` may deploy
    pub fn is_allowed(&self, owner: OwnerId) -> bool {
        self.options.allowed_owners.is_empty() || self.options.allowed_owners.contains(&owner)
    }

    /// The owner's current stage, if a session is open
    pub async fn stage(&self, owner: OwnerId) -> Option<Stage> {
        let slot = self.slot(owner);
        let stage = slot.lock().await.as_ref().map(Session::stage);
        self.release(owner, &slot);
        stage
    }

    /// Open a new session, replacing any in-progress one
    pub async fn start(&self, owner: OwnerId) -> Result<Step, BotError> {
        if !self.is_allowed(owner) {
            warn!(owner, "Deploy refused for owner outside the allow-list");
            return Err(Rejection::AccessDenied.into());
        }

        let slot = self.slot(owner);
        let mut session = slot.lock().await;
        let replaced_previous = session.replace(Session::AwaitingName).is_some();
        if replaced_previous {
            info!(owner, "Intake session restarted");
        } else {
            info!(owner, "Intake session started");
        }
        Ok(Step::Started { replaced_previous })
    }

    /// Drop the owner's session from any stage
    pub async fn cancel(&self, owner: OwnerId) -> Step {
        let slot = self.slot(owner);
        let had_session = slot.lock().await.take().is_some();
        self.release(owner, &slot);
        if had_session {
            info!(owner, "Intake session cancelled");
        }
        Step::Cancelled { had_session }
    }

    /// Handle a text message for the owner's session
    pub async fn handle_text(&self, owner: OwnerId, text: &str) -> Result<Step, BotError> {
        let slot = self.slot(owner);
        let step = self.advance(owner, &slot, text).await;
        self.release(owner, &slot);
        step
    }

    async fn advance(&self, owner: OwnerId, slot: &Slot, text: &str) -> Result<Step, BotError> {
        let mut guard = slot.lock().await;
        let Some(session) = guard.take() else {
            return Ok(Step::NoSession);
        };

        // Every arm puts the session back unless it ends the conversation
        let input = text.trim();
        match session {
            Session::AwaitingName => {
                let mut checked = check_name(input);
                if checked.is_ok() && self.store.name_taken(input).await {
                    checked = Err(Rejection::NameTaken(input.to_string()));
                }
                if let Err(rejection) = checked {
                    *guard = Some(Session::AwaitingName);
                    return Err(rejection.into());
                }
                debug!(owner, name = input, "Name accepted");
                *guard = Some(Session::AwaitingToken {
                    name: input.to_string(),
                });
                Ok(Step::NameAccepted {
                    name: input.to_string(),
                })
            }

            Session::AwaitingToken { name } => {
                let verified = match check_token_shape(input) {
                    Ok(()) => self.verifier.verify(input).await,
                    Err(rejection) => Err(rejection.into()),
                };
                match verified {
                    Ok(bot) => {
                        debug!(owner, bot_id = bot.id, "Token accepted");
                        *guard = Some(Session::AwaitingFiles(Draft::new(name, input.to_string(), bot.clone())));
                        Ok(Step::TokenAccepted { bot })
                    }
                    Err(e) => {
                        *guard = Some(Session::AwaitingToken { name });
                        Err(e)
                    }
                }
            }

            Session::AwaitingFiles(draft) => {
                if !input.eq_ignore_ascii_case("/done") {
                    *guard = Some(Session::AwaitingFiles(draft));
                    return Ok(Step::Ignored(Stage::AwaitingFiles));
                }
                if draft.entry_point.is_none() {
                    *guard = Some(Session::AwaitingFiles(draft));
                    return Err(Rejection::MissingEntryPoint.into());
                }
                let summary = draft.summary();
                *guard = Some(Session::AwaitingConfirmation(draft));
                Ok(Step::ReadyToConfirm(summary))
            }

            Session::AwaitingConfirmation(draft) => {
                if input != CONFIRM {
                    *guard = Some(Session::AwaitingConfirmation(draft));
                    return Ok(Step::Ignored(Stage::AwaitingConfirmation));
                }
                self.complete(owner, draft, &mut guard).await
            }
        }
    }

    async fn complete(
        &self,
        owner: OwnerId,
        draft: Draft,
        guard: &mut Option<Session>,
    ) -> Result<Step, BotError> {
        match self.store.create(owner, draft.clone().into()).await {
            Ok(deployment) => {
                info!(owner, name = %deployment.name, "Deployment confirmed");
                self.supervisor.spawn(owner, &deployment.name);
                Ok(Step::Deployed(deployment))
            }
            Err(BotError::NameConflict(name)) => {
                warn!(owner, name = %name, "Name taken before confirmation, session discarded");
                Err(BotError::NameConflict(name))
            }
            Err(e) => {
                // keep the draft so the owner can confirm again
                *guard = Some(Session::AwaitingConfirmation(draft));
                Err(e)
            }
        }
    }

    /// Handle an uploaded file for the owner's session
    pub async fn handle_file(&self, owner: OwnerId, filename: &str, bytes: &[u8]) -> Result<Step, BotError> {
        let slot = self.slot(owner);
        let step = self.accept_file(owner, &slot, filename, bytes).await;
        self.release(owner, &slot);
        step
    }

    async fn accept_file(&self, owner: OwnerId, slot: &Slot, filename: &str, bytes: &[u8]) -> Result<Step, BotError> {
        let mut guard = slot.lock().await;
        let draft = match guard.as_mut() {
            None => return Ok(Step::NoSession),
            Some(Session::AwaitingFiles(draft)) => draft,
            Some(other) => return Ok(Step::Ignored(other.stage())),
        };

        check_filename(filename)?;
        let content = decode_text(filename, bytes, self.options.max_file_bytes)?;
        if !draft.files.contains_key(filename) && draft.files.len() >= self.options.max_files {
            return Err(Rejection::TooManyFiles(self.options.max_files).into());
        }

        let mut warnings = Vec::new();
        if is_entry_point(filename) {
            if !looks_like_bot(&content) {
                warnings.push(Warning::EntryPointNotABot);
            }
            draft.entry_point = Some(filename.to_string());
        }
        if filename == MANIFEST {
            draft.deps = parse_manifest(&content);
            if !has_chat_framework(&draft.deps) {
                warnings.push(Warning::MissingChatFramework);
            }
        }
        draft.files.insert(filename.to_string(), content);
        debug!(owner, filename, size = bytes.len(), "File accepted");

        Ok(Step::FileAccepted {
            filename: filename.to_string(),
            entry_point: draft.entry_point.clone(),
            files: draft.files.len(),
            deps: draft.deps.len(),
            warnings,
        })
    }
}
