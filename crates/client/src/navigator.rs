//! Navigation-level flows over the two stores.
//!
//! Front ends call these instead of sequencing store operations themselves:
//! the first-prompt handoff, clearing the detail view when its chat is
//! deleted, and mirroring renames into the open chat all live here.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use siteai_protocol::PostMessageResponse;
use tracing::{debug, info};

use crate::active_session::{ActiveSession, LoadOutcome};
use crate::directory::SessionDirectory;
use crate::error::ClientError;
use crate::gateway::ChatApi;
use crate::handoff::PendingPrompt;
use crate::identity::UserId;
use crate::token::TokenStore;

/// What opening a chat led to
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    /// Loaded; no prompt was waiting.
    Opened,
    /// Loaded, and the waiting prompt was posted with this result.
    Delivered(Result<PostMessageResponse, ClientError>),
    /// Another load or a leave started first. The handoff stays armed.
    Superseded,
}

pub struct Navigator {
    directory: Arc<SessionDirectory>,
    session: Arc<ActiveSession>,
    pending: PendingPrompt,
    /// Chat the armed prompt belongs to
    handoff_target: Mutex<Option<String>>,
    tokens: TokenStore,
}

impl Navigator {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        let directory = Arc::new(SessionDirectory::new(api.clone()));
        let session = Arc::new(ActiveSession::new(api.clone(), directory.clone()));
        Self {
            directory,
            session,
            pending: PendingPrompt::new(),
            handoff_target: Mutex::new(None),
            tokens: TokenStore::new(api),
        }
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn session(&self) -> &Arc<ActiveSession> {
        &self.session
    }

    pub fn pending(&self) -> &PendingPrompt {
        &self.pending
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub async fn refresh(&self, user: Option<&UserId>) -> Result<usize, ClientError> {
        self.directory.list(user).await
    }

    /// Create a chat; a non-blank `prompt` is held until the chat is opened.
    pub async fn start_chat(
        &self,
        user: Option<&UserId>,
        name: &str,
        prompt: Option<&str>,
    ) -> Result<String, ClientError> {
        let id = self.directory.create(user, name).await?;
        if let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) {
            self.pending.arm(prompt);
            *self.target() = Some(id.clone());
            debug!(
                component = "navigator",
                event = "navigator.handoff.armed",
                chat_id = %id,
            );
        }
        Ok(id)
    }

    /// Open a chat in the detail view and deliver a waiting prompt.
    pub async fn open_chat(
        &self,
        user: Option<&UserId>,
        chat_id: &str,
    ) -> Result<OpenOutcome, ClientError> {
        match self.session.load(chat_id).await? {
            LoadOutcome::Superseded => return Ok(OpenOutcome::Superseded),
            LoadOutcome::Applied => {}
        }

        let is_target = {
            let mut target = self.target();
            if target.as_deref() == Some(chat_id) {
                target.take();
                true
            } else {
                false
            }
        };
        if !is_target {
            return Ok(OpenOutcome::Opened);
        }
        let Some(prompt) = self.pending.consume_if_loaded() else {
            return Ok(OpenOutcome::Opened);
        };
        info!(
            component = "navigator",
            event = "navigator.handoff.delivered",
            chat_id = %chat_id,
            "Posting the chat's first prompt"
        );
        let sent = self.session.post_message(user, chat_id, &prompt).await;
        Ok(OpenOutcome::Delivered(sent))
    }

    pub fn leave_chat(&self) {
        self.session.clear();
    }

    pub async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), ClientError> {
        self.directory.rename(chat_id, name).await?;
        self.session.mirror_name(chat_id, name.trim());
        Ok(())
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        self.directory.delete(chat_id).await?;
        if self.session.chat_id().as_deref() == Some(chat_id) {
            self.session.clear();
        }
        Ok(())
    }

    fn target(&self) -> MutexGuard<'_, Option<String>> {
        self.handoff_target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
