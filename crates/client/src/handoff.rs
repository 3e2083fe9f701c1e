//! Pending-prompt handoff.
//!
//! Carries the first prompt of a freshly created chat across the
//! navigation into its detail view. The prompt is consumed exactly once,
//! and only after that chat's detail has been loaded.

use std::sync::{Mutex, PoisonError};

use tracing::debug;

#[derive(Debug, Default)]
pub struct PendingPrompt {
    slot: Mutex<Option<String>>,
}

impl PendingPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a prompt for the next loaded chat. A later arm replaces an
    /// earlier one that was never consumed.
    pub fn arm(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            debug!(
                component = "handoff",
                event = "handoff.replaced",
                "Replacing an unconsumed pending prompt"
            );
        }
        *slot = Some(prompt);
    }

    /// Take the armed prompt. Call only after the target chat's load
    /// completed; later calls return `None`.
    pub fn consume_if_loaded(&self) -> Option<String> {
        let taken = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_some() {
            debug!(component = "handoff", event = "handoff.consumed");
        }
        taken
    }

    pub fn disarm(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
