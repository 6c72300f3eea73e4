//! Client for the boundary server.

use async_trait::async_trait;
use serde_json::json;

use crate::action::{ActionId, ActionStatus, StatusResponse, StatusSource};
use crate::error::{ChatError, Result};
use crate::orchestrator::RobotReply;

/// Talks to a running boundary server over HTTP.
#[derive(Debug, Clone)]
pub struct RobotChatClient {
    base_url: String,
    client: reqwest::Client,
}

impl RobotChatClient {
    /// Client for the server at `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Server root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /robotchat`.
    ///
    /// # Errors
    ///
    /// [`ChatError::UpstreamError`] carrying the server's error body on a
    /// non-2xx answer; transport and parse failures otherwise.
    pub async fn submit(&self, query: &str) -> Result<RobotReply> {
        let response = self
            .client
            .post(format!("{}/robotchat", self.base_url))
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("robotchat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ChatError::ParseError(format!("invalid robotchat reply: {e}")))
    }

    /// `GET /action_status_proxy`.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx answers and unparseable bodies.
    pub async fn action_status(&self, id: &ActionId) -> Result<ActionStatus> {
        let url = format!(
            "{}/action_status_proxy?action_id={}",
            self.base_url,
            urlencoding::encode(id.as_str())
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("status request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }
        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ChatError::ParseError(format!("invalid status body: {e}")))?;
        Ok(body.status)
    }

    /// `GET /health`; `true` when the server answers 2xx.
    pub async fn health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

#[async_trait]
impl StatusSource for RobotChatClient {
    async fn status(&self, id: &ActionId) -> Result<ActionStatus> {
        self.action_status(id).await
    }
}
