//! Robot action dispatch and completion tracking.
//!
//! - [`dispatcher`]: fire-and-forget submission of a directive.
//! - [`poller`]: fixed-cadence status polling until the action is done.
//! - [`session`]: per-conversation context owning the current action.
//!
//! The robot-control collaborator is reached through two small traits,
//! [`ActionSink`] and [`StatusSource`], so that the dispatcher and poller can
//! run against the real HTTP server, the boundary proxy route, or an
//! in-process stub.

pub mod dispatcher;
pub mod poller;
pub mod session;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::reply::ActionDirective;

pub use dispatcher::{ActionDispatcher, DispatchTicket};
pub use poller::{PollHandle, PollState, StatusPoller};
pub use session::ActionSession;

/// Length of the random suffix of an [`ActionId`].
const ID_SUFFIX_LEN: usize = 8;

/// Alphabet for the random suffix (base 36).
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of one dispatched action.
///
/// Generated as `<unix millis>-<8 base-36 chars>`. Unique enough for one
/// operator session, not globally. The empty id means "nothing dispatched".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generate a fresh id from the wall clock and a random suffix.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(format!("{millis}-{suffix}"))
    }

    /// The "no action" id.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Whether this is the "no action" id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution state of an action as reported by the robot-control server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Still executing.
    Pending,
    /// Finished.
    Done,
    /// No action in flight, or the id is not recognized.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ActionStatus {
    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Wire shape of `{status}` bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Reported status; absent means unknown.
    #[serde(default)]
    pub status: ActionStatus,
}

/// Body posted to the robot-control server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// The directive to execute.
    pub action: ActionDirective,
    /// Id under which the robot reports progress.
    pub action_id: ActionId,
}

/// Accepts directives for execution.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Submit one action.
    async fn submit(&self, request: &ActionRequest) -> Result<()>;
}

/// Answers status queries for dispatched actions.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Current status of `id`.
    async fn status(&self, id: &ActionId) -> Result<ActionStatus>;
}

/// HTTP client for the robot-control server.
///
/// `POST {base}/action` submits, `GET {base}/action_status?action_id=` queries.
#[derive(Debug, Clone)]
pub struct HttpActionBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpActionBackend {
    /// Create a backend rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a backend sharing an existing HTTP client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        }
    }

    /// The root URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ActionSink for HttpActionBackend {
    async fn submit(&self, request: &ActionRequest) -> Result<()> {
        let url = format!("{}/action", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("action submit failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StatusSource for HttpActionBackend {
    async fn status(&self, id: &ActionId) -> Result<ActionStatus> {
        let url = format!(
            "{}/action_status?action_id={}",
            self.base_url,
            urlencoding::encode(id.as_str())
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("action status query failed: {e}")))?;

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
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn generated_ids_have_time_and_suffix() {
        let id = ActionId::generate();
        let (millis, suffix) = id.as_str().split_once('-').unwrap();
        assert!(millis.parse::<u128>().unwrap() > 0);
        assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let ids: HashSet<ActionId> = (0..500).map(|_| ActionId::generate()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn empty_id() {
        assert!(ActionId::empty().is_empty());
        assert!(!ActionId::generate().is_empty());
        assert_eq!(serde_json::to_value(ActionId::empty()).unwrap(), json!(""));
    }

    #[test]
    fn status_deserializes_lowercase_and_unknown_values() {
        let done: StatusResponse = serde_json::from_value(json!({"status": "done"})).unwrap();
        assert_eq!(done.status, ActionStatus::Done);
        let pending: StatusResponse =
            serde_json::from_value(json!({"status": "pending"})).unwrap();
        assert_eq!(pending.status, ActionStatus::Pending);
        let other: StatusResponse =
            serde_json::from_value(json!({"status": "running"})).unwrap();
        assert_eq!(other.status, ActionStatus::Unknown);
        let missing: StatusResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.status, ActionStatus::Unknown);
    }

    #[test]
    fn only_done_is_terminal() {
        assert!(ActionStatus::Done.is_terminal());
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(!ActionStatus::Unknown.is_terminal());
    }

    #[tokio::test]
    async fn http_backend_posts_action_and_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action"))
            .and(body_json(json!({"action": "wave", "action_id": "1-abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpActionBackend::new(format!("{}/", server.uri()));
        assert_eq!(backend.base_url(), server.uri());
        let request = ActionRequest {
            action: ActionDirective::new("wave"),
            action_id: ActionId::from("1-abc"),
        };
        backend.submit(&request).await.unwrap();
    }

    #[tokio::test]
    async fn http_backend_maps_submit_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/action"))
            .respond_with(ResponseTemplate::new(500).set_body_string("ble offline"))
            .mount(&server)
            .await;

        let backend = HttpActionBackend::new(server.uri());
        let request = ActionRequest {
            action: ActionDirective::new("wave"),
            action_id: ActionId::generate(),
        };
        match backend.submit(&request).await {
            Err(ChatError::UpstreamError { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "ble offline");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_backend_queries_status_with_encoded_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/action_status"))
            .and(query_param("action_id", "a b&c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "done"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpActionBackend::new(server.uri());
        let status = backend.status(&ActionId::from("a b&c")).await.unwrap();
        assert_eq!(status, ActionStatus::Done);
    }
}
