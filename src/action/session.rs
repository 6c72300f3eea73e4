//! Per-conversation action context.

use super::{ActionId, ActionStatus, PollHandle, StatusPoller};
use crate::reply::ChatReply;
use tracing::debug;

/// Owns the reply and action of the most recent request.
///
/// Last request wins: [`begin_request`](Self::begin_request) drops the
/// previous reply and cancels the previous poller before anything new is
/// sent. Dispatches already in flight are not recalled.
#[derive(Debug)]
pub struct ActionSession {
    poller: StatusPoller,
    current: Option<PollHandle>,
    reply: Option<ChatReply>,
    loading: bool,
}

impl ActionSession {
    /// Create an idle session that polls through `poller`.
    pub fn new(poller: StatusPoller) -> Self {
        Self {
            poller,
            current: None,
            reply: None,
            loading: false,
        }
    }

    /// Reset for a new request and mark the session as loading.
    pub fn begin_request(&mut self) {
        if let Some(previous) = self.current.take() {
            if let Some(id) = previous.action_id() {
                debug!(action_id = %id, "superseding previous action");
            }
            previous.cancel();
        }
        self.reply = None;
        self.loading = true;
    }

    /// Record a successful reply and start watching its action.
    ///
    /// `on_done` runs once when the robot reports completion. With an empty
    /// `action_id` nothing is polled and the status stays unknown.
    pub fn track<F>(&mut self, reply: ChatReply, action_id: ActionId, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.loading = false;
        self.reply = Some(reply);
        self.current = Some(self.poller.watch(action_id, on_done));
    }

    /// Clear the loading flag after a failed request.
    pub fn fail_request(&mut self) {
        self.loading = false;
    }

    /// Reply of the current request, if it succeeded.
    pub fn reply(&self) -> Option<&ChatReply> {
        self.reply.as_ref()
    }

    /// Id of the action being watched.
    pub fn action_id(&self) -> Option<&ActionId> {
        self.current.as_ref().and_then(PollHandle::action_id)
    }

    /// Status of the current action. `Unknown` when nothing is watched.
    pub fn status(&self) -> ActionStatus {
        self.current
            .as_ref()
            .map_or(ActionStatus::Unknown, |handle| handle.state().into())
    }

    /// Whether new input should be refused: a request is in flight or an
    /// action is still pending.
    pub fn is_busy(&self) -> bool {
        self.loading || self.status() == ActionStatus::Pending
    }

    /// Wait until the current action finishes or stops being watched.
    pub async fn wait_for_action(&mut self) -> ActionStatus {
        match self.current.as_mut() {
            Some(handle) => handle.wait_done().await.into(),
            None => ActionStatus::Unknown,
        }
    }
}
