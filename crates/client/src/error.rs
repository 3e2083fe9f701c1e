//! Client error taxonomy and the per-store error slot.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Fallback text when a failed response carries no readable message
pub const UNKNOWN_ERROR: &str = "An unknown error occurred";

static OCCURRENCES: AtomicU64 = AtomicU64::new(1);

/// Errors surfaced by the stores
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No user id was supplied by the identity provider
    #[error("User not found")]
    Unauthenticated,

    #[error("{0} is empty")]
    EmptyInput(&'static str),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// True for failures raised before any request was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::Unauthenticated
                | ClientError::EmptyInput(_)
                | ClientError::NotFound(_)
                | ClientError::InvalidConfig(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ClientError::RequestFailed {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ClientError::Unreachable(err.to_string())
        }
    }
}

/// One occurrence of an error, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    pub error: ClientError,
    pub occurred_at: DateTime<Utc>,
    /// Process-wide increasing counter; tells apart repeats within one clock tick.
    pub occurrence: u64,
}

impl ErrorState {
    pub fn new(error: ClientError) -> Self {
        Self {
            error,
            occurred_at: Utc::now(),
            occurrence: OCCURRENCES.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

/// Remembers the last error occurrence a front end announced, so each
/// occurrence is shown once and a recurrence of the same message is shown again.
#[derive(Debug, Default)]
pub struct ErrorAnnouncer {
    last: Option<u64>,
}

impl ErrorAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the error if it has not been announced yet.
    pub fn take_new<'a>(&mut self, current: Option<&'a ErrorState>) -> Option<&'a ErrorState> {
        let state = current?;
        if self.last == Some(state.occurrence) {
            return None;
        }
        self.last = Some(state.occurrence);
        Some(state)
    }
}
