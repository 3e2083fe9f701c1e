//! Client → Server request bodies

use serde::{Deserialize, Serialize};

/// Body of `POST /chats/users/{userId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
}

/// Body of `POST /chats/{chatId}/rename`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameChatRequest {
    pub name: String,
}

/// Body of `POST /chats/{chatId}/messages/{userId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub input: String,
}

/// Body of `POST /chats/users/{userId}/token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveTokenRequest {
    pub token: String,
}
