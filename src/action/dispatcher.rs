//! Fire-and-forget action dispatch.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{ActionId, ActionRequest, ActionSink};
use crate::error::{ChatError, Result};
use crate::reply::ActionDirective;

/// Submits directives to the robot-control collaborator without waiting.
///
/// The id is generated before the request is issued and returned at once.
/// Delivery failures are logged and otherwise swallowed; callers that need
/// to know use [`dispatch_tracked`](Self::dispatch_tracked).
///
/// Must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct ActionDispatcher {
    sink: Arc<dyn ActionSink>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher").finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    /// Create a dispatcher over `sink`.
    pub fn new(sink: Arc<dyn ActionSink>) -> Self {
        Self { sink }
    }

    /// Dispatch `directive` and return its id immediately.
    pub fn dispatch(&self, directive: ActionDirective) -> ActionId {
        self.dispatch_tracked(directive).id
    }

    /// Dispatch `directive`, returning its id and a handle on the delivery outcome.
    ///
    /// Dropping the ticket does not cancel delivery.
    pub fn dispatch_tracked(&self, directive: ActionDirective) -> DispatchTicket {
        let id = ActionId::generate();
        let request = ActionRequest {
            action: directive,
            action_id: id.clone(),
        };
        info!(action_id = %id, action = %request.action, "dispatching action");

        let sink = Arc::clone(&self.sink);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = sink.submit(&request).await;
            match &result {
                Ok(()) => debug!(action_id = %request.action_id, "action delivered"),
                Err(e) => warn!(
                    action_id = %request.action_id,
                    error = %e,
                    "action dispatch failed"
                ),
            }
            let _ = tx.send(result);
        });

        DispatchTicket { id, outcome: rx }
    }
}

/// Id of a dispatched action plus its pending delivery outcome.
#[derive(Debug)]
pub struct DispatchTicket {
    /// The id sent alongside the directive.
    pub id: ActionId,
    outcome: oneshot::Receiver<Result<()>>,
}

impl DispatchTicket {
    /// Wait for the collaborator to accept or reject the action.
    ///
    /// # Errors
    ///
    /// Returns the delivery error, or [`ChatError::Cancelled`] if the send task
    /// was torn down before finishing.
    pub async fn outcome(self) -> Result<()> {
        self.outcome
            .await
            .map_err(|_| ChatError::Cancelled("dispatch task ended without a result".to_owned()))?
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records submissions; optionally blocks until released or fails.
    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<ActionRequest>>,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    #[async_trait]
    impl ActionSink for RecordingSink {
        async fn submit(&self, request: &ActionRequest) -> Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                Err(ChatError::RequestError("connection refused".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn dispatch_returns_before_delivery() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink {
            gate: Some(Arc::clone(&gate)),
            ..RecordingSink::default()
        });
        let dispatcher = ActionDispatcher::new(sink.clone());

        let ticket = dispatcher.dispatch_tracked(ActionDirective::new("wave"));
        assert!(!ticket.id.is_empty());
        assert!(sink.seen.lock().unwrap().is_empty());

        gate.notify_one();
        ticket.outcome().await.unwrap();

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].action.as_str(), Some("wave"));
    }

    #[tokio::test]
    async fn dispatched_request_carries_returned_id() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = ActionDispatcher::new(sink.clone());

        let ticket = dispatcher.dispatch_tracked(ActionDirective::new("bow"));
        let id = ticket.id.clone();
        ticket.outcome().await.unwrap();

        assert_eq!(sink.seen.lock().unwrap()[0].action_id, id);
    }

    #[tokio::test]
    async fn failures_are_swallowed_by_plain_dispatch() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let dispatcher = ActionDispatcher::new(sink.clone());

        let id = dispatcher.dispatch(ActionDirective::new("wave"));
        assert!(!id.is_empty());

        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.seen.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn tracked_dispatch_surfaces_failure() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let dispatcher = ActionDispatcher::new(sink);

        let err = dispatcher
            .dispatch_tracked(ActionDirective::new("wave"))
            .outcome()
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::error_codes::REQUEST_FAILED);
    }
}
