//! Outbound chat replies

use serde::{Deserialize, Serialize};

/// An inline button attached to a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    pub data: String,
}

/// A message sent back to an owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, label: impl Into<String>, data: impl Into<String>) -> Self {
        self.actions.push(Action {
            label: label.into(),
            data: data.into(),
        });
        self
    }
}
