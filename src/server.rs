//! HTTP boundary server.
//!
//! ## Endpoints
//!
//! - `POST /robotchat`: one chat turn, `{query}` in, `{chat, act, action_id, ...}` out
//! - `GET /action_status_proxy?action_id=<id>`: robot action status, `{status}`
//! - `GET /health`: liveness

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::action::{ActionDispatcher, ActionId, ActionStatus, HttpActionBackend, StatusSource};
use crate::chat::{ChatBackend, DifyClient};
use crate::config::{RobotChatConfig, ServerConfig};
use crate::credentials::{CredentialSource, resolve_api_key};
use crate::error::{ChatError, Result};
use crate::orchestrator::ChatOrchestrator;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<ChatOrchestrator>,
    status: Arc<dyn StatusSource>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// State from explicit parts.
    pub fn new(orchestrator: ChatOrchestrator, status: Arc<dyn StatusSource>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            status,
        }
    }

    /// Wire the real collaborators from configuration.
    ///
    /// The chat credential is read once here. A missing credential does not
    /// fail startup; every `/robotchat` call answers 500 instead.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConfigError`] if an HTTP client cannot be built.
    pub fn from_config(config: &RobotChatConfig, credentials: &dyn CredentialSource) -> Result<Self> {
        let api_key = resolve_api_key(credentials, &config.chat.api_key_env);
        if api_key.is_none() {
            warn!(
                variable = %config.chat.api_key_env,
                "chat credential not set; /robotchat will answer 500"
            );
        }
        let chat: Arc<dyn ChatBackend> = Arc::new(DifyClient::new(&config.chat, api_key)?);
        let backend = Arc::new(HttpActionBackend::new(config.action.base_url.clone()));
        let dispatcher = ActionDispatcher::new(backend.clone());
        Ok(Self::new(ChatOrchestrator::new(chat, dispatcher), backend))
    }
}

/// Build the router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/robotchat", post(handle_robotchat))
        .route("/action_status_proxy", get(handle_action_status))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Running boundary server. Dropping it stops serving.
#[derive(Debug)]
pub struct RobotChatServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RobotChatServer {
    /// Bind `config.host:config.port` (port `0` picks a free port) and serve.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConfigError`] if the address cannot be bound.
    pub async fn start(state: AppState, config: &ServerConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ChatError::ConfigError(format!("cannot bind {bind_addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ChatError::ConfigError(format!("failed to get local addr: {e}")))?;

        info!("robotchat server listening on http://{addr}");

        let app = router(state);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("robotchat server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `http://<addr>`, for clients.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop serving.
    pub fn shutdown(&self) {
        self.handle.abort();
    }

    /// Whether the serve task has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RobotChatServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Deserialize)]
struct RobotChatRequest {
    #[serde(default)]
    query: Option<String>,
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `POST /robotchat`
async fn handle_robotchat(State(state): State<AppState>, body: Bytes) -> Response {
    let request: RobotChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejecting malformed /robotchat body");
            return error_body(StatusCode::BAD_REQUEST, "invalid JSON body");
        }
    };
    let query = request.query.unwrap_or_default();

    match state.orchestrator.submit(&query).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(ChatError::ConfigError(detail)) => {
            error!(%detail, "chat credential missing");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "chat credential is not configured")
        }
        Err(ChatError::ValidationError(detail)) => {
            warn!(%detail, "rejecting empty query");
            error_body(StatusCode::BAD_REQUEST, "query is required")
        }
        Err(ChatError::UpstreamError { status, body }) => {
            warn!(status, "chat collaborator failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "chat service error", "detail": body })),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "chat turn failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn status_body(code: StatusCode, status: ActionStatus) -> Response {
    (code, Json(json!({ "status": status }))).into_response()
}

/// `GET /action_status_proxy`
async fn handle_action_status(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let id = match params.get("action_id") {
        Some(id) if !id.is_empty() => ActionId::from(id.as_str()),
        _ => return status_body(StatusCode::BAD_REQUEST, ActionStatus::Unknown),
    };

    match state.status.status(&id).await {
        Ok(status) => status_body(StatusCode::OK, status),
        Err(e) => {
            warn!(action_id = %id, error = %e, "robot status unavailable");
            status_body(StatusCode::BAD_GATEWAY, ActionStatus::Unknown)
        }
    }
}

/// `GET /health`
async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
