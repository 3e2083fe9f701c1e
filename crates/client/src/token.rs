//! The user's upstream model API token, as stored by the backend.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::{ClientError, ErrorState};
use crate::gateway::ChatApi;
use crate::identity::UserId;
use crate::EVENT_CAPACITY;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    Loaded { present: bool },
    Saved,
    Cleared,
    Error(ErrorState),
}

#[derive(Debug, Clone, Default)]
pub struct TokenSnapshot {
    /// `None` until fetched; an empty string means the user has no token.
    pub token: Option<String>,
    pub error: Option<ErrorState>,
}

pub struct TokenStore {
    api: Arc<dyn ChatApi>,
    state: Mutex<TokenSnapshot>,
    snapshot: ArcSwap<TokenSnapshot>,
    events_tx: broadcast::Sender<TokenEvent>,
}

impl TokenStore {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            state: Mutex::new(TokenSnapshot::default()),
            snapshot: ArcSwap::from_pointee(TokenSnapshot::default()),
            events_tx,
        }
    }

    pub fn snapshot(&self) -> Arc<TokenSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TokenEvent> {
        self.events_tx.subscribe()
    }

    pub fn token(&self) -> Option<String> {
        self.snapshot().token.clone()
    }

    pub fn error(&self) -> Option<ErrorState> {
        self.snapshot().error.clone()
    }

    pub async fn fetch(&self, user: Option<&UserId>) -> Result<String, ClientError> {
        let Some(user) = user else {
            return Err(self.fail(ClientError::Unauthenticated));
        };
        let resp = self
            .api
            .get_token(user)
            .await
            .map_err(|err| self.fail(err))?;
        let present = !resp.token.is_empty();
        self.mutate(|s| {
            s.token = Some(resp.token.clone());
            s.error = None;
        });
        self.emit(TokenEvent::Loaded { present });
        Ok(resp.token)
    }

    pub async fn save(&self, user: Option<&UserId>, token: &str) -> Result<(), ClientError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(self.fail(ClientError::EmptyInput("Token")));
        }
        let Some(user) = user else {
            return Err(self.fail(ClientError::Unauthenticated));
        };
        self.api
            .save_token(user, token)
            .await
            .map_err(|err| self.fail(err))?;
        self.mutate(|s| {
            s.token = Some(token.to_string());
            s.error = None;
        });
        info!(
            component = "token",
            event = "token.saved",
            user_id = %user,
            "API token saved"
        );
        self.emit(TokenEvent::Saved);
        Ok(())
    }

    /// Forget the local copy. The backend keeps its token.
    pub fn clear(&self) {
        self.mutate(|s| *s = TokenSnapshot::default());
        self.emit(TokenEvent::Cleared);
    }

    fn mutate(&self, f: impl FnOnce(&mut TokenSnapshot)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
        self.snapshot.store(Arc::new(state.clone()));
    }

    fn emit(&self, event: TokenEvent) {
        let _ = self.events_tx.send(event);
    }

    fn fail(&self, err: ClientError) -> ClientError {
        let state = ErrorState::new(err.clone());
        warn!(
            component = "token",
            event = "token.error",
            error = %err,
            "Token operation failed"
        );
        self.mutate(|s| s.error = Some(state.clone()));
        self.emit(TokenEvent::Error(state));
        err
    }
}
