//! Session directory: the current user's chat list.
//!
//! The only place the list is mutated. Network calls happen outside the
//! state lock; each mutation runs to completion under the lock, then a fresh
//! snapshot is published and an event broadcast.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use siteai_protocol::{ChatSummary, DEFAULT_CHAT_NAME};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::active_session::ChatStatusSink;
use crate::error::{ClientError, ErrorState};
use crate::gateway::ChatApi;
use crate::identity::UserId;
use crate::EVENT_CAPACITY;

/// Change notifications for list listeners
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    ChatsReplaced { count: usize },
    ChatCreated { chat: ChatSummary },
    ChatRenamed { chat_id: String, name: String },
    ChatDeleted { chat_id: String },
    ProcessingChanged { chat_id: String, is_processing: bool },
    Error(ErrorState),
}

/// Immutable view of the directory
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    /// Newest first, except freshly created chats which sit at the front
    /// until the next `list`.
    pub chats: Vec<ChatSummary>,
    pub error: Option<ErrorState>,
}

impl DirectorySnapshot {
    pub fn get(&self, chat_id: &str) -> Option<&ChatSummary> {
        self.chats.iter().find(|c| c.id == chat_id)
    }
}

#[derive(Default)]
struct DirectoryState {
    chats: Vec<ChatSummary>,
    /// Keyed by id so flags survive a list refresh and cover unlisted chats.
    processing: HashSet<String>,
    error: Option<ErrorState>,
}

impl DirectoryState {
    fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            chats: self
                .chats
                .iter()
                .map(|c| ChatSummary {
                    is_processing: self.processing.contains(&c.id),
                    ..c.clone()
                })
                .collect(),
            error: self.error.clone(),
        }
    }

    fn find_mut(&mut self, chat_id: &str) -> Option<&mut ChatSummary> {
        self.chats.iter_mut().find(|c| c.id == chat_id)
    }
}

/// Newest first; equal timestamps fall back to id order.
fn sort_newest_first(chats: &mut [ChatSummary]) {
    chats.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub struct SessionDirectory {
    api: Arc<dyn ChatApi>,
    state: Mutex<DirectoryState>,
    snapshot: ArcSwap<DirectorySnapshot>,
    events_tx: broadcast::Sender<DirectoryEvent>,
}

impl SessionDirectory {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            state: Mutex::new(DirectoryState::default()),
            snapshot: ArcSwap::from_pointee(DirectorySnapshot::default()),
            events_tx,
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events_tx.subscribe()
    }

    pub fn chats(&self) -> Vec<ChatSummary> {
        self.snapshot().chats.clone()
    }

    pub fn error(&self) -> Option<ErrorState> {
        self.snapshot().error.clone()
    }

    pub fn clear_error(&self) {
        self.mutate(|s| s.error = None);
    }

    pub fn name_of(&self, chat_id: &str) -> Option<String> {
        self.snapshot().get(chat_id).map(|c| c.name.clone())
    }

    /// Fetch the user's chats and replace the local list.
    pub async fn list(&self, user: Option<&UserId>) -> Result<usize, ClientError> {
        let Some(user) = user else {
            return Err(self.fail(ClientError::NotFound("User".into())));
        };

        let mut chats = match self.api.list_chats(user).await {
            Ok(chats) => chats,
            Err(err) => return Err(self.fail(err)),
        };
        sort_newest_first(&mut chats);
        let count = chats.len();

        self.mutate(|s| s.chats = chats);
        debug!(
            component = "directory",
            event = "directory.list.loaded",
            user_id = %user,
            count,
        );
        self.emit(DirectoryEvent::ChatsReplaced { count });
        Ok(count)
    }

    /// Create a chat and put it at the front of the list.
    pub async fn create(&self, user: Option<&UserId>, name: &str) -> Result<String, ClientError> {
        let Some(user) = user else {
            return Err(self.fail(ClientError::Unauthenticated));
        };
        let name = match name.trim() {
            "" => DEFAULT_CHAT_NAME,
            trimmed => trimmed,
        };

        let created = match self.api.create_chat(user, name).await {
            Ok(chat) => chat,
            Err(err) => return Err(self.fail(err)),
        };
        let id = created.id.clone();

        self.mutate(|s| {
            s.chats.retain(|c| c.id != created.id);
            s.chats.insert(0, created.clone());
        });
        info!(
            component = "directory",
            event = "directory.chat.created",
            chat_id = %id,
            "Chat created"
        );
        self.emit(DirectoryEvent::ChatCreated { chat: created });
        Ok(id)
    }

    /// Rename on the server, then locally. Nothing changes locally on failure.
    pub async fn rename(&self, chat_id: &str, name: &str) -> Result<(), ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(self.fail(ClientError::EmptyInput("Name")));
        }

        if let Err(err) = self.api.rename_chat(chat_id, name).await {
            return Err(self.fail(err));
        }

        if let Err(err) = self.update_name(chat_id, name) {
            debug!(
                component = "directory",
                event = "directory.rename.unlisted",
                chat_id = %chat_id,
                error = %err,
                "Renamed chat is not in the local list"
            );
        }
        Ok(())
    }

    /// Delete on the server; the summary is removed only once that succeeds.
    pub async fn delete(&self, chat_id: &str) -> Result<(), ClientError> {
        if let Err(err) = self.api.delete_chat(chat_id).await {
            return Err(self.fail(err));
        }

        self.mutate(|s| {
            s.chats.retain(|c| c.id != chat_id);
            s.processing.remove(chat_id);
        });
        info!(
            component = "directory",
            event = "directory.chat.deleted",
            chat_id = %chat_id,
            "Chat deleted"
        );
        self.emit(DirectoryEvent::ChatDeleted {
            chat_id: chat_id.to_string(),
        });
        Ok(())
    }

    /// Set a listed chat's name without a server call.
    pub fn update_name(&self, chat_id: &str, name: &str) -> Result<(), ClientError> {
        let changed = self.mutate(|s| match s.find_mut(chat_id) {
            Some(chat) if chat.name == name => Ok(false),
            Some(chat) => {
                chat.name = name.to_string();
                Ok(true)
            }
            None => Err(ClientError::NotFound("Chat".into())),
        })?;
        if changed {
            self.emit(DirectoryEvent::ChatRenamed {
                chat_id: chat_id.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_processing(&self, chat_id: &str, value: bool) {
        let changed = self.mutate(|s| {
            if value {
                s.processing.insert(chat_id.to_string())
            } else {
                s.processing.remove(chat_id)
            }
        });
        if changed {
            self.emit(DirectoryEvent::ProcessingChanged {
                chat_id: chat_id.to_string(),
                is_processing: value,
            });
        }
    }

    pub fn is_processing(&self, chat_id: &str) -> bool {
        self.lock().processing.contains(chat_id)
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut DirectoryState) -> R) -> R {
        let mut state = self.lock();
        let out = f(&mut state);
        self.snapshot.store(Arc::new(state.snapshot()));
        out
    }

    fn emit(&self, event: DirectoryEvent) {
        // No receivers is fine
        let _ = self.events_tx.send(event);
    }

    /// Record the error as the directory's current ErrorState and hand it back.
    fn fail(&self, err: ClientError) -> ClientError {
        let state = ErrorState::new(err.clone());
        warn!(
            component = "directory",
            event = "directory.error",
            error = %err,
            "Directory operation failed"
        );
        self.mutate(|s| s.error = Some(state.clone()));
        self.emit(DirectoryEvent::Error(state));
        err
    }
}

impl ChatStatusSink for SessionDirectory {
    fn set_processing(&self, chat_id: &str, value: bool) {
        SessionDirectory::set_processing(self, chat_id, value);
    }

    fn update_name(&self, chat_id: &str, name: &str) {
        if let Err(err) = SessionDirectory::update_name(self, chat_id, name) {
            debug!(
                component = "directory",
                event = "directory.name.unlisted",
                chat_id = %chat_id,
                error = %err,
            );
        }
    }
}
