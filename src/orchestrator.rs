//! Chat request orchestration.
//!
//! One call to [`ChatOrchestrator::submit`] is one user turn: exactly one
//! chat collaborator request, then at most one action dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::{ActionDispatcher, ActionId};
use crate::chat::ChatBackend;
use crate::error::{ChatError, Result};
use crate::reply::ChatReply;

/// Reply returned to the caller: the normalized chat reply plus the id of
/// the dispatched action (empty when nothing was dispatched).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotReply {
    /// Normalized chat reply, including pass-through fields.
    #[serde(flatten)]
    pub reply: ChatReply,
    /// Id of the dispatched action.
    #[serde(default)]
    pub action_id: ActionId,
}

impl RobotReply {
    /// Whether an action was dispatched for this reply.
    pub fn has_action(&self) -> bool {
        !self.action_id.is_empty()
    }
}

/// Forwards utterances to the chat service and dispatches the resulting directive.
#[derive(Clone)]
pub struct ChatOrchestrator {
    chat: Arc<dyn ChatBackend>,
    dispatcher: ActionDispatcher,
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("configured", &self.chat.is_configured())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl ChatOrchestrator {
    /// Create an orchestrator over a chat backend and a dispatcher.
    pub fn new(chat: Arc<dyn ChatBackend>, dispatcher: ActionDispatcher) -> Self {
        Self { chat, dispatcher }
    }

    /// Handle one utterance.
    ///
    /// # Errors
    ///
    /// - [`ChatError::ConfigError`] when the chat credential is missing.
    /// - [`ChatError::ValidationError`] when `utterance` is empty.
    /// - [`ChatError::UpstreamError`] / [`ChatError::RequestError`] when the
    ///   chat service fails.
    /// - [`ChatError::ParseError`] when its body is not JSON.
    pub async fn submit(&self, utterance: &str) -> Result<RobotReply> {
        if !self.chat.is_configured() {
            return Err(ChatError::ConfigError("chat credential is not set".to_owned()));
        }
        if utterance.is_empty() {
            return Err(ChatError::ValidationError("query is required".to_owned()));
        }

        let body = self.chat.send(utterance).await?;
        let reply = ChatReply::from_body(&body)?;

        let action_id = match reply.directive() {
            Some(directive) => self.dispatcher.dispatch(directive.clone()),
            None => {
                debug!("reply carries no action");
                ActionId::empty()
            }
        };
        info!(action_id = %action_id, chars = reply.chat.chars().count(), "chat turn complete");

        Ok(RobotReply { reply, action_id })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::action::{ActionRequest, ActionSink};
    use crate::error::error_codes;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeChat {
        configured: bool,
        body: String,
        calls: AtomicUsize,
    }

    impl FakeChat {
        fn answering(body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                configured: true,
                body: body.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for FakeChat {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn send(&self, _query: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<ActionRequest>>);

    #[async_trait]
    impl ActionSink for CollectingSink {
        async fn submit(&self, request: &ActionRequest) -> Result<()> {
            self.0.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn orchestrator(chat: Arc<FakeChat>, sink: Arc<CollectingSink>) -> ChatOrchestrator {
        ChatOrchestrator::new(chat, ActionDispatcher::new(sink))
    }

    async fn wait_for_submissions(sink: &CollectingSink, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.0.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn truthy_directive_is_dispatched_with_returned_id() {
        let chat = FakeChat::answering(json!({"answer": "{\"chat\":\"hi\",\"act\":\"wave\"}"}));
        let sink = Arc::new(CollectingSink::default());
        let reply = orchestrator(chat.clone(), sink.clone())
            .submit("wave at me")
            .await
            .unwrap();

        assert_eq!(reply.reply.chat, "hi");
        assert!(reply.has_action());
        wait_for_submissions(&sink, 1).await;

        let seen = sink.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].action_id, reply.action_id);
        assert_eq!(seen[0].action.as_str(), Some("wave"));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_directive_means_empty_id_and_no_dispatch() {
        let chat = FakeChat::answering(json!({"answer": "just talking"}));
        let sink = Arc::new(CollectingSink::default());
        let reply = orchestrator(chat, sink.clone()).submit("hello").await.unwrap();

        assert_eq!(reply.reply.chat, "just talking");
        assert!(!reply.has_action());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn falsy_directive_is_not_dispatched() {
        let chat = FakeChat::answering(json!({"answer": {"chat": "ok", "act": ""}}));
        let sink = Arc::new(CollectingSink::default());
        let reply = orchestrator(chat, sink.clone()).submit("hello").await.unwrap();
        assert!(reply.action_id.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_utterance_is_rejected_without_calls() {
        let chat = FakeChat::answering(json!({"answer": "x"}));
        let err = orchestrator(chat.clone(), Arc::default())
            .submit("")
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::VALIDATION_FAILED);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn whitespace_utterance_is_sent_once() {
        let chat = FakeChat::answering(json!({"answer": "what was that?"}));
        let reply = orchestrator(chat.clone(), Arc::default())
            .submit("   ")
            .await
            .unwrap();
        assert_eq!(reply.reply.chat, "what was that?");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_credential_is_config_error() {
        let chat = Arc::new(FakeChat {
            configured: false,
            body: String::new(),
            calls: AtomicUsize::new(0),
        });
        let err = orchestrator(chat.clone(), Arc::default())
            .submit("hello")
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::CONFIG_INVALID);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_json_body_is_parse_error() {
        let chat = Arc::new(FakeChat {
            configured: true,
            body: "<html>".to_owned(),
            calls: AtomicUsize::new(0),
        });
        let err = orchestrator(chat, Arc::default())
            .submit("hello")
            .await
            .unwrap_err();
        assert_eq!(err.code(), error_codes::PARSE_FAILED);
    }

    #[test]
    fn robot_reply_serializes_flat() {
        let reply = RobotReply {
            reply: ChatReply::from_value(json!({"chat": "hi", "act": "wave", "conversation_id": "c1"})),
            action_id: ActionId::from("1-abc"),
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"chat": "hi", "act": "wave", "conversation_id": "c1", "action_id": "1-abc"})
        );
    }

    #[test]
    fn robot_reply_without_action_has_empty_id() {
        let reply = RobotReply {
            reply: ChatReply::text("hello"),
            action_id: ActionId::empty(),
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"chat": "hello", "act": null, "action_id": ""})
        );
    }
}
