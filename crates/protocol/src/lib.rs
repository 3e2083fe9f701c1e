//! Site.ai Protocol
//!
//! Types exchanged with the Site.ai chat API.
//! These types are serialized as JSON over HTTP.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod server;
pub mod timestamp;
pub mod types;

pub use client::{CreateChatRequest, PostMessageRequest, RenameChatRequest, SaveTokenRequest};
pub use server::{ErrorBody, PostMessageResponse, TokenResponse};
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
