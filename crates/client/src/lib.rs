//! Site.ai client core
//!
//! Two stores kept consistent over the chat API: the [`SessionDirectory`]
//! (chat list) and the [`ActiveSession`] (the one open chat), plus the
//! [`PendingPrompt`] handoff that carries a prompt across navigation.
//! The [`Navigator`] wires them together for front ends.

pub mod active_session;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod handoff;
pub mod identity;
pub mod navigator;
pub mod token;

#[cfg(test)]
mod test_support;

pub use active_session::{
    ActiveSession, ChatStatusSink, LoadOutcome, SessionEvent, SessionPhase, SessionSnapshot,
};
pub use config::ClientConfig;
pub use directory::{DirectoryEvent, DirectorySnapshot, SessionDirectory};
pub use error::{ClientError, ErrorAnnouncer, ErrorState};
pub use gateway::{ChatApi, HttpGateway};
pub use handoff::PendingPrompt;
pub use identity::UserId;
pub use navigator::{Navigator, OpenOutcome};
pub use token::{TokenEvent, TokenSnapshot, TokenStore};

/// Capacity of each store's event channel
pub(crate) const EVENT_CAPACITY: usize = 256;
