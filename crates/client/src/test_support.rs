//! In-memory `ChatApi` for store tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use siteai_protocol::{
    ChatDetail, ChatSummary, CodeArtifact, CodePatch, Message, PostMessageResponse, TokenResponse,
};
use tokio::sync::oneshot;

use crate::error::ClientError;
use crate::gateway::ChatApi;
use crate::identity::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Create,
    Get,
    Rename,
    Delete,
    Post,
    GetToken,
    SaveToken,
}

#[derive(Default)]
struct FakeState {
    chats: Vec<ChatDetail>,
    failures: HashMap<Op, Vec<ClientError>>,
    post_replies: Vec<PostMessageResponse>,
    post_gates: Vec<oneshot::Receiver<()>>,
    get_gates: Vec<oneshot::Receiver<()>>,
    calls: Vec<Op>,
    token: String,
    next_id: u32,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn user() -> UserId {
    UserId::parse("user_1").unwrap()
}

pub fn chat(id: &str, name: &str, created_secs: i64) -> ChatDetail {
    ChatDetail {
        id: id.to_string(),
        name: name.to_string(),
        created_at: at(created_secs),
        messages: Vec::new(),
        code: CodeArtifact::default(),
    }
}

pub fn reply(content: &str, code: CodePatch, name: Option<&str>) -> PostMessageResponse {
    PostMessageResponse {
        message: Message::assistant(siteai_protocol::new_id(), content),
        code,
        name: name.map(str::to_string),
    }
}

fn take_gate(gates: &mut Vec<oneshot::Receiver<()>>) -> Option<oneshot::Receiver<()>> {
    if gates.is_empty() {
        None
    } else {
        Some(gates.remove(0))
    }
}

fn summary(chat: &ChatDetail) -> ChatSummary {
    ChatSummary {
        id: chat.id.clone(),
        name: chat.name.clone(),
        created_at: chat.created_at,
        is_processing: false,
    }
}

impl FakeApi {
    pub fn with_chats(chats: Vec<ChatDetail>) -> Self {
        let api = Self::default();
        api.state.lock().unwrap().chats = chats;
        api
    }

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: Op, err: ClientError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push(err);
    }

    /// Queue the response for the next successful post.
    pub fn queue_reply(&self, reply: PostMessageResponse) {
        self.state.lock().unwrap().post_replies.push(reply);
    }

    /// Hold the next post in flight until the returned sender fires.
    pub fn gate_next_post(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().post_gates.push(rx);
        tx
    }

    /// Hold the next chat fetch in flight until the returned sender fires.
    pub fn gate_next_get(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().get_gates.push(rx);
        tx
    }

    pub fn set_token(&self, token: &str) {
        self.state.lock().unwrap().token = token.to_string();
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    fn begin(&self, op: Op) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op);
        match state.failures.get_mut(&op) {
            Some(queue) if !queue.is_empty() => Err(queue.remove(0)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_chats(&self, _user: &UserId) -> Result<Vec<ChatSummary>, ClientError> {
        self.begin(Op::List)?;
        Ok(self.state.lock().unwrap().chats.iter().map(summary).collect())
    }

    async fn create_chat(&self, _user: &UserId, name: &str) -> Result<ChatSummary, ClientError> {
        self.begin(Op::Create)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let created = chat(&format!("new-{}", state.next_id), name, -1_000);
        let out = summary(&created);
        state.chats.push(created);
        Ok(out)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatDetail, ClientError> {
        let gate = take_gate(&mut self.state.lock().unwrap().get_gates);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.begin(Op::Get)?;
        self.state
            .lock()
            .unwrap()
            .chats
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| ClientError::RequestFailed {
                status: 404,
                message: "Chat not found".into(),
            })
    }

    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), ClientError> {
        self.begin(Op::Rename)?;
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.chats.iter_mut().find(|c| c.id == chat_id) {
            c.name = name.to_string();
        }
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        self.begin(Op::Delete)?;
        self.state.lock().unwrap().chats.retain(|c| c.id != chat_id);
        Ok(())
    }

    async fn post_message(
        &self,
        _chat_id: &str,
        _user: &UserId,
        prompt: &str,
    ) -> Result<PostMessageResponse, ClientError> {
        let gate = take_gate(&mut self.state.lock().unwrap().post_gates);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.begin(Op::Post)?;
        let mut state = self.state.lock().unwrap();
        if state.post_replies.is_empty() {
            Ok(reply(&format!("re: {prompt}"), CodePatch::default(), None))
        } else {
            Ok(state.post_replies.remove(0))
        }
    }

    async fn get_token(&self, _user: &UserId) -> Result<TokenResponse, ClientError> {
        self.begin(Op::GetToken)?;
        Ok(TokenResponse {
            token: self.state.lock().unwrap().token.clone(),
        })
    }

    async fn save_token(&self, _user: &UserId, token: &str) -> Result<(), ClientError> {
        self.begin(Op::SaveToken)?;
        self.state.lock().unwrap().token = token.to_string();
        Ok(())
    }
}
