//! Request gateway: the chat API seam and its HTTP implementation.
//!
//! Every failed call is classified the same way: 401 → `Unauthorized`,
//! 403 → `Forbidden`, other non-2xx → `RequestFailed` carrying the body's
//! `detail`/`message`, no response at all → `Unreachable`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use siteai_protocol::{
    ChatDetail, ChatSummary, CreateChatRequest, ErrorBody, PostMessageRequest,
    PostMessageResponse, RenameChatRequest, SaveTokenRequest, TokenResponse,
};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, UNKNOWN_ERROR};
use crate::identity::UserId;

/// Operations the backend exposes. The stores depend only on this trait.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_chats(&self, user: &UserId) -> Result<Vec<ChatSummary>, ClientError>;

    async fn create_chat(&self, user: &UserId, name: &str) -> Result<ChatSummary, ClientError>;

    async fn get_chat(&self, chat_id: &str) -> Result<ChatDetail, ClientError>;

    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), ClientError>;

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError>;

    async fn post_message(
        &self,
        chat_id: &str,
        user: &UserId,
        prompt: &str,
    ) -> Result<PostMessageResponse, ClientError>;

    async fn get_token(&self, user: &UserId) -> Result<TokenResponse, ClientError>;

    async fn save_token(&self, user: &UserId, token: &str) -> Result<(), ClientError>;
}

/// `ChatApi` over HTTP
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base: Url,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        if config.api_url.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig(format!(
                "API url {} cannot carry a path",
                config.api_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            client,
            base: config.api_url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Append percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.client.request(method, self.url(segments))
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let resp = req.send().await.map_err(|e| {
            warn!(
                component = "gateway",
                event = "gateway.request.unreachable",
                error = %e,
                "Request got no response"
            );
            ClientError::Unreachable(e.to_string())
        })?;

        let status = resp.status();
        if status.is_success() {
            debug!(
                component = "gateway",
                event = "gateway.request.ok",
                url = %resp.url(),
                status = status.as_u16(),
            );
            return Ok(resp);
        }

        let url = resp.url().clone();
        let body = resp.text().await.unwrap_or_default();
        let err = error_from_status(status, &body);
        warn!(
            component = "gateway",
            event = "gateway.request.failed",
            url = %url,
            status = status.as_u16(),
            error = %err,
            "Request failed"
        );
        Err(err)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = self.send(req).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    async fn fetch_empty(&self, req: RequestBuilder) -> Result<(), ClientError> {
        self.send(req).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpGateway {
    async fn list_chats(&self, user: &UserId) -> Result<Vec<ChatSummary>, ClientError> {
        self.fetch_json(self.request(Method::GET, &["chats", "users", user.as_str(), "all"]))
            .await
    }

    async fn create_chat(&self, user: &UserId, name: &str) -> Result<ChatSummary, ClientError> {
        let body = CreateChatRequest {
            name: name.to_string(),
        };
        self.fetch_json(
            self.request(Method::POST, &["chats", "users", user.as_str()])
                .json(&body),
        )
        .await
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatDetail, ClientError> {
        self.fetch_json(self.request(Method::GET, &["chats", chat_id]))
            .await
    }

    async fn rename_chat(&self, chat_id: &str, name: &str) -> Result<(), ClientError> {
        let body = RenameChatRequest {
            name: name.to_string(),
        };
        self.fetch_empty(
            self.request(Method::POST, &["chats", chat_id, "rename"])
                .json(&body),
        )
        .await
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        self.fetch_empty(self.request(Method::DELETE, &["chats", chat_id]))
            .await
    }

    async fn post_message(
        &self,
        chat_id: &str,
        user: &UserId,
        prompt: &str,
    ) -> Result<PostMessageResponse, ClientError> {
        let body = PostMessageRequest {
            input: prompt.to_string(),
        };
        self.fetch_json(
            self.request(Method::POST, &["chats", chat_id, "messages", user.as_str()])
                .json(&body),
        )
        .await
    }

    async fn get_token(&self, user: &UserId) -> Result<TokenResponse, ClientError> {
        self.fetch_json(self.request(Method::GET, &["chats", "users", user.as_str(), "token"]))
            .await
    }

    async fn save_token(&self, user: &UserId, token: &str) -> Result<(), ClientError> {
        let body = SaveTokenRequest {
            token: token.to_string(),
        };
        self.fetch_empty(
            self.request(Method::POST, &["chats", "users", user.as_str(), "token"])
                .json(&body),
        )
        .await
    }
}

/// Classify a non-2xx response.
pub fn error_from_status(status: StatusCode, body: &str) -> ClientError {
    let text = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.text());
    match status {
        StatusCode::UNAUTHORIZED => {
            ClientError::Unauthorized(text.unwrap_or_else(|| "Unauthorized".to_string()))
        }
        StatusCode::FORBIDDEN => {
            ClientError::Forbidden(text.unwrap_or_else(|| "Forbidden".to_string()))
        }
        _ => ClientError::RequestFailed {
            status: status.as_u16(),
            message: text.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        },
    }
}
