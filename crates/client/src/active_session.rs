//! Active session: the one chat open in the detail view.
//!
//! Owns the transcript and code artifact of exactly one chat and runs the
//! optimistic post protocol:
//!
//! 1. reject blank prompts and missing identity without touching state,
//! 2. append a locally-identified user message and flag the chat as
//!    processing (visible before the request is dispatched),
//! 3. on success append the reply, patch code, adopt the returned name,
//! 4. on failure remove the optimistic message by its local id.
//!
//! The processing flag is cleared on both paths. Phases:
//! `Idle → Loading → Ready ⇄ Sending`, `Ready → Idle` on clear.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use siteai_protocol::{ChatDetail, CodeArtifact, Message, PostMessageResponse};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ErrorState};
use crate::gateway::ChatApi;
use crate::identity::UserId;
use crate::EVENT_CAPACITY;

/// What the active session reports about a chat to the list view.
///
/// Implemented by [`crate::SessionDirectory`]; the session never reads the
/// list itself.
pub trait ChatStatusSink: Send + Sync {
    fn set_processing(&self, chat_id: &str, value: bool);
    fn update_name(&self, chat_id: &str, name: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Loading,
    Ready,
    Sending,
}

/// Change notifications for detail-view listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged(SessionPhase),
    Loaded { chat_id: String },
    MessageAppended { chat_id: String, message: Message },
    MessageRolledBack { chat_id: String, message_id: String },
    CodeUpdated { chat_id: String, code: CodeArtifact },
    Renamed { chat_id: String, name: String },
    Cleared,
    Error(ErrorState),
}

/// Result of a `load` that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer load or a clear started before this one finished.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub chat: ChatDetail,
    pub error: Option<ErrorState>,
    /// Sends for the open chat that have not settled yet
    pub pending_sends: usize,
}

struct SessionState {
    phase: SessionPhase,
    chat: ChatDetail,
    error: Option<ErrorState>,
    pending_sends: usize,
    /// Bumped whenever `chat` is replaced; sends only settle their own count.
    generation: u64,
    /// Bumped by every load and clear; only the newest load may apply.
    load_ticket: u64,
    next_local: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            chat: ChatDetail::empty(),
            error: None,
            pending_sends: 0,
            generation: 0,
            load_ticket: 0,
            next_local: 0,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            chat: self.chat.clone(),
            error: self.error.clone(),
            pending_sends: self.pending_sends,
        }
    }

    fn next_local_id(&mut self) -> String {
        self.next_local += 1;
        format!("local-{}", self.next_local)
    }

    fn replace_chat(&mut self, chat: ChatDetail, phase: SessionPhase) {
        self.chat = chat;
        self.phase = phase;
        self.pending_sends = 0;
        self.generation += 1;
    }

    /// Account for one settled send. Returns the new phase if it changed.
    fn settle(&mut self, dispatch_generation: Option<u64>) -> Option<SessionPhase> {
        if dispatch_generation != Some(self.generation) {
            return None;
        }
        self.pending_sends = self.pending_sends.saturating_sub(1);
        if self.pending_sends == 0 && self.phase == SessionPhase::Sending {
            self.phase = SessionPhase::Ready;
            return Some(SessionPhase::Ready);
        }
        None
    }
}

/// Optimistic bookkeeping for one in-flight send
struct Dispatch {
    local_id: Option<String>,
    generation: Option<u64>,
}

#[derive(Default)]
struct Settled {
    events: Vec<SessionEvent>,
}

pub struct ActiveSession {
    api: Arc<dyn ChatApi>,
    status: Arc<dyn ChatStatusSink>,
    state: Mutex<SessionState>,
    snapshot: ArcSwap<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl ActiveSession {
    pub fn new(api: Arc<dyn ChatApi>, status: Arc<dyn ChatStatusSink>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let state = SessionState::new();
        let snapshot = ArcSwap::from_pointee(state.snapshot());
        Self {
            api,
            status,
            state: Mutex::new(state),
            snapshot,
            events_tx,
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.snapshot().phase
    }

    /// Id of the open chat, `None` while showing the empty sentinel.
    pub fn chat_id(&self) -> Option<String> {
        let snap = self.snapshot();
        (!snap.chat.is_empty_sentinel()).then(|| snap.chat.id.clone())
    }

    pub fn error(&self) -> Option<ErrorState> {
        self.snapshot().error.clone()
    }

    /// Fetch a chat and make it the open one.
    ///
    /// A failed load keeps whatever was shown before and ends `Ready`, or
    /// `Sending` while sends for the open chat are still in flight.
    pub async fn load(&self, chat_id: &str) -> Result<LoadOutcome, ClientError> {
        let ticket = self.mutate(|s| {
            s.load_ticket += 1;
            s.phase = SessionPhase::Loading;
            s.error = None;
            s.load_ticket
        });
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Loading));

        match self.api.get_chat(chat_id).await {
            Ok(mut detail) => {
                detail.normalize();
                let applied = self.mutate(|s| {
                    if s.load_ticket != ticket {
                        return false;
                    }
                    s.replace_chat(detail, SessionPhase::Ready);
                    true
                });
                if !applied {
                    debug!(
                        component = "active_session",
                        event = "session.load.superseded",
                        chat_id = %chat_id,
                    );
                    return Ok(LoadOutcome::Superseded);
                }
                info!(
                    component = "active_session",
                    event = "session.load.applied",
                    chat_id = %chat_id,
                    "Chat loaded"
                );
                self.emit(SessionEvent::Loaded {
                    chat_id: chat_id.to_string(),
                });
                self.emit(SessionEvent::PhaseChanged(SessionPhase::Ready));
                Ok(LoadOutcome::Applied)
            }
            Err(err) => {
                // Sends for the still-open chat keep the session in Sending
                let phase = self.mutate(|s| {
                    if s.load_ticket != ticket {
                        return None;
                    }
                    s.phase = if s.pending_sends > 0 {
                        SessionPhase::Sending
                    } else {
                        SessionPhase::Ready
                    };
                    Some(s.phase)
                });
                let Some(phase) = phase else {
                    debug!(
                        component = "active_session",
                        event = "session.load.superseded",
                        chat_id = %chat_id,
                        error = %err,
                    );
                    return Err(err);
                };
                self.emit(SessionEvent::PhaseChanged(phase));
                Err(self.fail(err))
            }
        }
    }

    /// Send a prompt to `chat_id`, optimistically showing it first.
    pub async fn post_message(
        &self,
        user: Option<&UserId>,
        chat_id: &str,
        prompt: &str,
    ) -> Result<PostMessageResponse, ClientError> {
        if prompt.trim().is_empty() {
            return Err(self.fail(ClientError::EmptyInput("Prompt")));
        }
        let Some(user) = user else {
            return Err(self.fail(ClientError::Unauthenticated));
        };
        if chat_id.trim().is_empty() {
            return Err(self.fail(ClientError::NotFound("Chat".into())));
        }

        let (dispatch, events) = self.mutate(|s| {
            let mut events = Vec::new();
            if s.chat.id != chat_id {
                let dispatch = Dispatch {
                    local_id: None,
                    generation: None,
                };
                return (dispatch, events);
            }
            let message = Message::user(s.next_local_id(), prompt);
            s.chat.messages.push(message.clone());
            s.pending_sends += 1;
            let local_id = message.id.clone();
            events.push(SessionEvent::MessageAppended {
                chat_id: chat_id.to_string(),
                message,
            });
            if s.phase == SessionPhase::Ready {
                s.phase = SessionPhase::Sending;
                events.push(SessionEvent::PhaseChanged(SessionPhase::Sending));
            }
            let dispatch = Dispatch {
                local_id: Some(local_id),
                generation: Some(s.generation),
            };
            (dispatch, events)
        });
        self.status.set_processing(chat_id, true);
        events.into_iter().for_each(|e| self.emit(e));

        debug!(
            component = "active_session",
            event = "session.post.dispatched",
            chat_id = %chat_id,
            optimistic = dispatch.local_id.is_some(),
        );

        match self.api.post_message(chat_id, user, prompt).await {
            Ok(resp) => {
                self.commit(chat_id, &dispatch, &resp);
                Ok(resp)
            }
            Err(err) => {
                self.rollback(chat_id, &dispatch);
                Err(self.fail(err))
            }
        }
    }

    /// Adopt a name the list view just confirmed, if that chat is open.
    pub fn mirror_name(&self, chat_id: &str, name: &str) {
        let renamed = self.mutate(|s| {
            if s.chat.id != chat_id || s.chat.name == name {
                return false;
            }
            s.chat.name = name.to_string();
            true
        });
        if renamed {
            self.emit(SessionEvent::Renamed {
                chat_id: chat_id.to_string(),
                name: name.to_string(),
            });
        }
    }

    /// Close the open chat. In-flight sends still settle the list view.
    pub fn clear(&self) {
        self.mutate(|s| {
            s.load_ticket += 1;
            s.error = None;
            s.replace_chat(ChatDetail::empty(), SessionPhase::Idle);
        });
        self.emit(SessionEvent::Cleared);
        self.emit(SessionEvent::PhaseChanged(SessionPhase::Idle));
    }

    fn commit(&self, chat_id: &str, dispatch: &Dispatch, resp: &PostMessageResponse) {
        let mut reply = resp.message.clone();
        reply.ensure_id();
        let name = resp
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let settled = self.mutate(|s| {
            let mut out = Settled::default();
            // A late reply for a chat that is no longer open leaves the transcript alone
            if s.chat.id == chat_id {
                if !s.chat.contains_message(&reply.id) {
                    s.chat.messages.push(reply.clone());
                    out.events.push(SessionEvent::MessageAppended {
                        chat_id: chat_id.to_string(),
                        message: reply.clone(),
                    });
                }
                if s.chat.code.apply(&resp.code) {
                    out.events.push(SessionEvent::CodeUpdated {
                        chat_id: chat_id.to_string(),
                        code: s.chat.code.clone(),
                    });
                }
                if let Some(name) = name.filter(|n| *n != s.chat.name) {
                    s.chat.name = name.to_string();
                    out.events.push(SessionEvent::Renamed {
                        chat_id: chat_id.to_string(),
                        name: name.to_string(),
                    });
                }
            }
            if let Some(phase) = s.settle(dispatch.generation) {
                out.events.push(SessionEvent::PhaseChanged(phase));
            }
            out
        });

        if let Some(name) = name {
            self.status.update_name(chat_id, name);
        }
        self.status.set_processing(chat_id, false);
        info!(
            component = "active_session",
            event = "session.post.committed",
            chat_id = %chat_id,
            "Prompt answered"
        );
        settled.events.into_iter().for_each(|e| self.emit(e));
    }

    fn rollback(&self, chat_id: &str, dispatch: &Dispatch) {
        let settled = self.mutate(|s| {
            let mut out = Settled::default();
            if let Some(local_id) = dispatch.local_id.as_deref() {
                let before = s.chat.messages.len();
                s.chat.messages.retain(|m| m.id != local_id);
                if s.chat.messages.len() != before {
                    out.events.push(SessionEvent::MessageRolledBack {
                        chat_id: chat_id.to_string(),
                        message_id: local_id.to_string(),
                    });
                }
            }
            if let Some(phase) = s.settle(dispatch.generation) {
                out.events.push(SessionEvent::PhaseChanged(phase));
            }
            out
        });

        self.status.set_processing(chat_id, false);
        settled.events.into_iter().for_each(|e| self.emit(e));
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let out = f(&mut state);
        self.snapshot.store(Arc::new(state.snapshot()));
        out
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn fail(&self, err: ClientError) -> ClientError {
        let state = ErrorState::new(err.clone());
        warn!(
            component = "active_session",
            event = "session.error",
            error = %err,
            "Active session operation failed"
        );
        self.mutate(|s| s.error = Some(state.clone()));
        self.emit(SessionEvent::Error(state));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::SessionDirectory;
    use crate::test_support::{chat, reply, user, FakeApi, Op};
    use siteai_protocol::{CodePatch, MessageRole};

    struct Fixture {
        api: Arc<FakeApi>,
        dir: Arc<SessionDirectory>,
        session: Arc<ActiveSession>,
    }

    async fn fixture(chats: Vec<ChatDetail>) -> Fixture {
        let api = Arc::new(FakeApi::with_chats(chats));
        let dir = Arc::new(SessionDirectory::new(api.clone()));
        dir.list(Some(&user())).await.unwrap();
        let session = Arc::new(ActiveSession::new(api.clone(), dir.clone()));
        Fixture { api, dir, session }
    }

    fn styled_chat(id: &str) -> ChatDetail {
        let mut c = chat(id, "New Chat", 1);
        c.code = CodeArtifact {
            html: String::new(),
            css: "body{}".into(),
            js: "init()".into(),
        };
        c
    }

    async fn settle_tasks() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn load_replaces_detail_and_failure_keeps_it() {
        let mut first = chat("a", "First", 1);
        first.messages.push(Message::user("m1", "hi"));
        let fx = fixture(vec![first, chat("b", "Second", 2)]).await;

        assert_eq!(fx.session.phase(), SessionPhase::Idle);
        assert_eq!(fx.session.load("a").await.unwrap(), LoadOutcome::Applied);
        assert_eq!(fx.session.phase(), SessionPhase::Ready);
        assert_eq!(fx.session.chat_id().as_deref(), Some("a"));

        fx.api
            .fail_next(Op::Get, ClientError::Unreachable("refused".into()));
        assert!(fx.session.load("b").await.is_err());

        let snap = fx.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Ready);
        assert_eq!(snap.chat.id, "a");
        assert_eq!(snap.chat.messages.len(), 1);
        assert!(snap.error.is_some());

        // Retry by calling load again
        fx.session.load("b").await.unwrap();
        assert_eq!(fx.session.chat_id().as_deref(), Some("b"));
        assert!(fx.session.error().is_none());
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_without_mutation() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();

        let err = fx
            .session
            .post_message(Some(&user()), "a", "   ")
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::EmptyInput("Prompt"));

        let snap = fx.session.snapshot();
        assert!(snap.chat.messages.is_empty());
        assert_eq!(snap.phase, SessionPhase::Ready);
        assert_eq!(snap.error.as_ref().unwrap().message(), "Prompt is empty");
        assert!(!fx.dir.is_processing("a"));
        assert_eq!(fx.api.calls(Op::Post), 0);
    }

    #[tokio::test]
    async fn missing_identity_is_rejected_without_mutation() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();

        let err = fx.session.post_message(None, "a", "hello").await.unwrap_err();
        assert_eq!(err, ClientError::Unauthenticated);
        assert!(fx.session.snapshot().chat.messages.is_empty());
        assert_eq!(fx.api.calls(Op::Post), 0);
    }

    #[tokio::test]
    async fn successful_post_commits_reply_code_and_name() {
        let fx = fixture(vec![styled_chat("a")]).await;
        fx.session.load("a").await.unwrap();
        fx.api.queue_reply(reply(
            "hi",
            CodePatch {
                html: Some("<p/>".into()),
                ..Default::default()
            },
            Some("Greeting"),
        ));

        fx.session
            .post_message(Some(&user()), "a", "hello")
            .await
            .unwrap();

        let snap = fx.session.snapshot();
        let transcript: Vec<_> = snap
            .chat
            .messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            transcript,
            vec![(MessageRole::User, "hello"), (MessageRole::Assistant, "hi")]
        );
        assert_eq!(snap.chat.code.html, "<p/>");
        assert_eq!(snap.chat.code.css, "body{}");
        assert_eq!(snap.chat.code.js, "init()");
        assert_eq!(snap.chat.name, "Greeting");
        assert_eq!(snap.phase, SessionPhase::Ready);
        assert_eq!(fx.dir.name_of("a").as_deref(), Some("Greeting"));
        assert!(!fx.dir.is_processing("a"));
    }

    #[tokio::test]
    async fn failed_post_rolls_back_optimistic_message() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();
        fx.api.fail_next(
            Op::Post,
            ClientError::Unauthorized("Unauthorized: No token found".into()),
        );

        let err = fx
            .session
            .post_message(Some(&user()), "a", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized(_)));

        let snap = fx.session.snapshot();
        assert!(snap.chat.messages.is_empty());
        assert_eq!(snap.phase, SessionPhase::Ready);
        assert_eq!(snap.pending_sends, 0);
        assert_eq!(
            snap.error.as_ref().unwrap().message(),
            "Unauthorized: No token found"
        );
        assert!(!fx.dir.is_processing("a"));
    }

    #[tokio::test]
    async fn optimistic_message_is_visible_while_in_flight() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();
        let release = fx.api.gate_next_post();

        let session = fx.session.clone();
        let task = tokio::spawn(async move {
            session
                .post_message(Some(&user()), "a", "build a todo app")
                .await
        });
        settle_tasks().await;

        let snap = fx.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Sending);
        assert_eq!(snap.chat.messages.len(), 1);
        assert_eq!(snap.chat.messages[0].content, "build a todo app");
        assert!(snap.chat.messages[0].id.starts_with("local-"));
        assert!(fx.dir.is_processing("a"));
        assert!(fx.dir.snapshot().get("a").unwrap().is_processing);

        release.send(()).unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(fx.session.phase(), SessionPhase::Ready);
        assert_eq!(fx.session.snapshot().chat.messages.len(), 2);
        assert!(!fx.dir.is_processing("a"));
    }

    #[tokio::test]
    async fn css_only_replies_never_clear_other_code() {
        let mut c = chat("a", "A", 1);
        c.code.html = "<main/>".into();
        c.code.js = "go()".into();
        let fx = fixture(vec![c]).await;
        fx.session.load("a").await.unwrap();

        for css in ["p{}", "h1{}"] {
            fx.api.queue_reply(reply(
                css,
                CodePatch {
                    css: Some(css.into()),
                    html: Some(String::new()),
                    js: None,
                },
                None,
            ));
            fx.session
                .post_message(Some(&user()), "a", "restyle")
                .await
                .unwrap();
        }

        let code = fx.session.snapshot().chat.code.clone();
        assert_eq!(code.html, "<main/>");
        assert_eq!(code.js, "go()");
        assert_eq!(code.css, "h1{}");
        // No name came back, the list keeps its name
        assert_eq!(fx.dir.name_of("a").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn rollback_targets_the_failed_send_not_an_equal_prompt() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();

        fx.session
            .post_message(Some(&user()), "a", "same")
            .await
            .unwrap();
        fx.api
            .fail_next(Op::Post, ClientError::Unreachable("refused".into()));
        assert!(fx
            .session
            .post_message(Some(&user()), "a", "same")
            .await
            .is_err());

        let snap = fx.session.snapshot();
        assert_eq!(snap.chat.messages.len(), 2);
        assert_eq!(snap.chat.messages[0].content, "same");
        assert_eq!(snap.chat.messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn late_reply_after_navigation_leaves_new_chat_alone() {
        let fx = fixture(vec![chat("a", "A", 1), chat("b", "B", 2)]).await;
        fx.session.load("a").await.unwrap();
        fx.api.queue_reply(reply("done", CodePatch::default(), Some("Todo app")));
        let release = fx.api.gate_next_post();

        let session = fx.session.clone();
        let task = tokio::spawn(async move {
            session
                .post_message(Some(&user()), "a", "build a todo app")
                .await
        });
        settle_tasks().await;

        fx.session.load("b").await.unwrap();
        release.send(()).unwrap();
        task.await.unwrap().unwrap();

        let snap = fx.session.snapshot();
        assert_eq!(snap.chat.id, "b");
        assert!(snap.chat.messages.is_empty());
        assert_eq!(snap.chat.name, "B");
        assert_eq!(snap.phase, SessionPhase::Ready);
        // The list view still settles
        assert_eq!(fx.dir.name_of("a").as_deref(), Some("Todo app"));
        assert!(!fx.dir.is_processing("a"));
    }

    #[tokio::test]
    async fn post_to_unopened_chat_only_touches_the_list() {
        let fx = fixture(vec![chat("a", "A", 1), chat("b", "B", 2)]).await;
        fx.session.load("b").await.unwrap();
        fx.api.queue_reply(reply("ok", CodePatch::default(), Some("Renamed A")));

        fx.session
            .post_message(Some(&user()), "a", "hello")
            .await
            .unwrap();

        assert!(fx.session.snapshot().chat.messages.is_empty());
        assert_eq!(fx.session.snapshot().chat.name, "B");
        assert_eq!(fx.dir.name_of("a").as_deref(), Some("Renamed A"));
    }

    #[tokio::test]
    async fn stale_load_does_not_overwrite_newer_one() {
        let fx = fixture(vec![chat("a", "A", 1), chat("b", "B", 2)]).await;
        let release = fx.api.gate_next_get();

        let session = fx.session.clone();
        let slow = tokio::spawn(async move { session.load("a").await });
        settle_tasks().await;

        assert_eq!(fx.session.load("b").await.unwrap(), LoadOutcome::Applied);
        release.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), LoadOutcome::Superseded);
        assert_eq!(fx.session.chat_id().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn clear_resets_to_sentinel() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();
        let _ = fx.session.post_message(Some(&user()), "a", " ").await;
        assert!(fx.session.error().is_some());

        let mut rx = fx.session.subscribe();
        fx.session.clear();

        let snap = fx.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Idle);
        assert!(snap.chat.is_empty_sentinel());
        assert!(snap.error.is_none());
        assert!(fx.session.chat_id().is_none());
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Cleared);
    }

    #[tokio::test]
    async fn mirror_name_only_touches_the_open_chat() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();

        fx.session.mirror_name("other", "Nope");
        assert_eq!(fx.session.snapshot().chat.name, "A");

        fx.session.mirror_name("a", "Landing page");
        assert_eq!(fx.session.snapshot().chat.name, "Landing page");
    }

    #[tokio::test]
    async fn failed_reload_during_send_stays_sending() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;
        fx.session.load("a").await.unwrap();
        let release = fx.api.gate_next_post();

        let session = fx.session.clone();
        let task =
            tokio::spawn(async move { session.post_message(Some(&user()), "a", "hello").await });
        settle_tasks().await;

        fx.api
            .fail_next(Op::Get, ClientError::Unreachable("refused".into()));
        assert!(fx.session.load("a").await.is_err());

        let snap = fx.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Sending);
        assert_eq!(snap.pending_sends, 1);
        assert!(fx.dir.is_processing("a"));

        release.send(()).unwrap();
        task.await.unwrap().unwrap();

        let snap = fx.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Ready);
        assert_eq!(snap.pending_sends, 0);
        assert_eq!(snap.chat.messages.len(), 2);
        assert!(!fx.dir.is_processing("a"));
    }

    #[tokio::test]
    async fn reply_with_known_id_is_not_appended_twice() {
        let mut c = chat("a", "A", 1);
        c.messages.push(Message::user("m1", "make a page"));
        c.messages.push(Message::assistant("m2", "done"));
        let fx = fixture(vec![c]).await;
        fx.session.load("a").await.unwrap();

        let mut echoed = reply("done", CodePatch::default(), None);
        echoed.message.id = "m2".into();
        fx.api.queue_reply(echoed);
        fx.session
            .post_message(Some(&user()), "a", "again")
            .await
            .unwrap();

        let snap = fx.session.snapshot();
        let ids: Vec<_> = snap.chat.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(&ids[..2], &["m1", "m2"]);
        assert!(ids[2].starts_with("local-"));
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test]
    async fn overlapping_posts_settle_their_own_chat() {
        let fx = fixture(vec![chat("a", "A", 1), chat("b", "B", 2)]).await;
        fx.session.load("a").await.unwrap();
        let release_a = fx.api.gate_next_post();
        let release_b = fx.api.gate_next_post();

        let session = fx.session.clone();
        let to_a =
            tokio::spawn(async move { session.post_message(Some(&user()), "a", "for a").await });
        settle_tasks().await;
        let session = fx.session.clone();
        let to_b =
            tokio::spawn(async move { session.post_message(Some(&user()), "b", "for b").await });
        settle_tasks().await;

        assert!(fx.dir.is_processing("a"));
        assert!(fx.dir.is_processing("b"));
        assert_eq!(fx.session.snapshot().pending_sends, 1);

        release_b.send(()).unwrap();
        to_b.await.unwrap().unwrap();

        let snap = fx.session.snapshot();
        assert!(!fx.dir.is_processing("b"));
        assert!(fx.dir.is_processing("a"));
        assert_eq!(snap.phase, SessionPhase::Sending);
        assert_eq!(snap.chat.messages.len(), 1);

        release_a.send(()).unwrap();
        to_a.await.unwrap().unwrap();

        let snap = fx.session.snapshot();
        assert!(!fx.dir.is_processing("a"));
        assert_eq!(snap.phase, SessionPhase::Ready);
        let contents: Vec<_> = snap.chat.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["for a", "re: for a"]);
    }

    #[tokio::test]
    async fn post_without_open_chat_is_rejected() {
        let fx = fixture(vec![chat("a", "A", 1)]).await;

        let err = fx
            .session
            .post_message(Some(&user()), "", "hello")
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::NotFound("Chat".into()));

        let snap = fx.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Idle);
        assert!(snap.chat.messages.is_empty());
        assert_eq!(fx.api.calls(Op::Post), 0);
    }
}
