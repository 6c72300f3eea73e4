//! Chat collaborator client.
//!
//! Talks to a Dify-style `chat-messages` endpoint in blocking mode and hands
//! back the raw body; normalization lives in [`crate::reply`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ChatConfig;
use crate::credentials::ApiKey;
use crate::error::{ChatError, Result};

/// Request body for `POST /chat-messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessageRequest {
    /// App input variables; always empty.
    pub inputs: Map<String, Value>,
    /// The user's utterance.
    pub query: String,
    /// Caller identity reported to the service.
    pub user: String,
    /// `"blocking"`: the whole reply in one body.
    pub response_mode: &'static str,
    /// `"json"`.
    pub response_format: &'static str,
}

impl ChatMessageRequest {
    /// Blocking JSON request for `query` on behalf of `user`.
    pub fn blocking(query: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            inputs: Map::new(),
            query: query.into(),
            user: user.into(),
            response_mode: "blocking",
            response_format: "json",
        }
    }
}

/// A conversational-AI service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Whether a credential is available. Unconfigured backends reject every call.
    fn is_configured(&self) -> bool;

    /// Send one utterance and return the raw response body.
    async fn send(&self, query: &str) -> Result<String>;
}

/// HTTP client for the Dify chat API.
#[derive(Debug, Clone)]
pub struct DifyClient {
    endpoint: String,
    user: String,
    api_key: Option<ApiKey>,
    client: reqwest::Client,
}

impl DifyClient {
    /// Build a client from configuration and an optional credential.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig, api_key: Option<ApiKey>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ChatError::ConfigError(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: format!("{}/chat-messages", config.base_url.trim_end_matches('/')),
            user: config.user.clone(),
            api_key,
            client,
        })
    }

    /// Full URL of the `chat-messages` endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for DifyClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn send(&self, query: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Err(ChatError::ConfigError("chat credential is not set".to_owned()));
        };

        let body = ChatMessageRequest::blocking(query, self.user.clone());
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key.expose()))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("chat request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChatError::RequestError(format!("chat body read failed: {e}")))?;
        debug!(status = status.as_u16(), body = %text, "chat collaborator response");

        if !status.is_success() {
            return Err(ChatError::UpstreamError {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}
