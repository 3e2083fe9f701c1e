//! Core types shared across the protocol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name the backend gives a chat until the first prompt renames it
pub const DEFAULT_CHAT_NAME: &str = "New Chat";

/// Message role
///
/// The backend spells the assistant role `"ai"`; `"assistant"` is accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

/// A message in a chat transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", alias = "role")]
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Give the message a fresh id if the server sent none.
    pub fn ensure_id(&mut self) {
        if self.id.trim().is_empty() {
            self.id = crate::new_id();
        }
    }
}

/// Generated code shown in the preview pane
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
}

impl CodeArtifact {
    /// Overwrite only the fields the patch carries with non-empty content.
    ///
    /// Returns true if any field changed.
    pub fn apply(&mut self, patch: &CodePatch) -> bool {
        let mut changed = false;
        for (slot, value) in [
            (&mut self.html, &patch.html),
            (&mut self.css, &patch.css),
            (&mut self.js, &patch.js),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                if slot.as_str() != value {
                    *slot = value.to_string();
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.css.is_empty() && self.js.is_empty()
    }
}

/// Code fields returned by a message post; missing or empty means "unchanged"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
}

/// Summary of a chat for list views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub name: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    /// A message send is in flight. Local only, never sent to the server.
    #[serde(default, skip_serializing)]
    pub is_processing: bool,
}

/// Full chat state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDetail {
    pub id: String,
    pub name: String,
    #[serde(with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub code: CodeArtifact,
}

impl ChatDetail {
    /// The detail shown while no chat is open.
    pub fn empty() -> Self {
        Self {
            id: String::new(),
            name: DEFAULT_CHAT_NAME.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
            code: CodeArtifact::default(),
        }
    }

    pub fn is_empty_sentinel(&self) -> bool {
        self.id.is_empty()
    }

    pub fn contains_message(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Fill missing message ids and drop repeated ones, keeping the first.
    pub fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.messages.retain_mut(|m| {
            m.ensure_id();
            seen.insert(m.id.clone())
        });
    }
}
