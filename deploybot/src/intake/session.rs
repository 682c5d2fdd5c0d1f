//! Intake conversation state

use std::collections::BTreeMap;

use crate::http::identity::BotIdentity;
use crate::models::deployment::NewDeployment;

/// Fields collected once name and token are accepted
#[derive(Clone, PartialEq, Eq)]
pub struct Draft {
    pub name: String,
    pub token: String,
    pub bot: BotIdentity,
    pub files: BTreeMap<String, String>,
    pub deps: Vec<String>,
    pub entry_point: Option<String>,
}

impl Draft {
    pub fn new(name: String, token: String, bot: BotIdentity) -> Self {
        Self {
            name,
            token,
            bot,
            files: BTreeMap::new(),
            deps: Vec::new(),
            entry_point: None,
        }
    }

    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            name: self.name.clone(),
            bot_username: self.bot.username.clone(),
            files: self.files.keys().cloned().collect(),
            deps: self.deps.clone(),
            entry_point: self.entry_point.clone(),
        }
    }
}

impl From<Draft> for NewDeployment {
    fn from(draft: Draft) -> Self {
        NewDeployment {
            name: draft.name,
            token: draft.token,
            files: draft.files,
            deps: draft.deps,
            entry_point: draft.entry_point,
        }
    }
}

impl std::fmt::Debug for Draft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draft")
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .field("bot", &self.bot)
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("deps", &self.deps)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

/// Printable view of a draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftSummary {
    pub name: String,
    pub bot_username: Option<String>,
    pub files: Vec<String>,
    pub deps: Vec<String>,
    pub entry_point: Option<String>,
}

/// A per-owner intake conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    AwaitingName,
    AwaitingToken { name: String },
    AwaitingFiles(Draft),
    AwaitingConfirmation(Draft),
}

impl Session {
    pub fn stage(&self) -> Stage {
        match self {
            Session::AwaitingName => Stage::AwaitingName,
            Session::AwaitingToken { .. } => Stage::AwaitingToken,
            Session::AwaitingFiles(_) => Stage::AwaitingFiles,
            Session::AwaitingConfirmation(_) => Stage::AwaitingConfirmation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingName,
    AwaitingToken,
    AwaitingFiles,
    AwaitingConfirmation,
}
