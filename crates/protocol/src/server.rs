//! Server → Client response bodies

use serde::{Deserialize, Serialize};

use crate::types::{CodePatch, Message};

/// Result of posting a prompt: the assistant reply, changed code, and the
/// chat's (possibly AI-generated) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMessageResponse {
    pub message: Message,
    #[serde(default)]
    pub code: CodePatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `GET /chats/users/{userId}/token`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: String,
}

/// Error payload of a non-2xx response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
}

impl ErrorBody {
    /// The first non-empty text among `detail` and `message`.
    pub fn text(&self) -> Option<String> {
        [&self.detail, &self.message]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                serde_json::Value::Null | serde_json::Value::String(_) => None,
                other => Some(other.to_string()),
            })
    }
}
