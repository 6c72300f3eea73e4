//! Action completion polling.
//!
//! [`StatusPoller::watch`] queries the robot-control collaborator every
//! `interval` (two seconds by default) until it reports `done`, then calls
//! the completion callback once and stops. There is no timeout or backoff:
//! a robot that never finishes is polled until the [`PollHandle`] is
//! cancelled or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ActionId, ActionStatus, StatusSource};

/// Default interval between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Poller lifecycle: `Idle -> Pending -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Nothing being watched (no id, or watching was cancelled).
    Idle,
    /// Waiting for the collaborator to report `done`.
    Pending,
    /// Completion observed; polling has stopped.
    Done,
}

impl From<PollState> for ActionStatus {
    fn from(state: PollState) -> Self {
        match state {
            PollState::Idle => ActionStatus::Unknown,
            PollState::Pending => ActionStatus::Pending,
            PollState::Done => ActionStatus::Done,
        }
    }
}

/// Spawns polling loops against a [`StatusSource`].
#[derive(Clone)]
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl StatusPoller {
    /// Create a poller with the default two-second cadence.
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The configured poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start watching `id`. `on_done` runs once, when `done` is first observed.
    ///
    /// An empty id starts nothing and returns an idle handle.
    pub fn watch<F>(&self, id: ActionId, on_done: F) -> PollHandle
    where
        F: FnOnce() + Send + 'static,
    {
        if id.is_empty() {
            return PollHandle::idle();
        }

        let (state_tx, state_rx) = watch::channel(PollState::Pending);
        let cancel = CancellationToken::new();
        tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            self.interval,
            id.clone(),
            cancel.clone(),
            state_tx,
            on_done,
        ));

        PollHandle {
            action_id: Some(id),
            cancel,
            state: state_rx,
        }
    }
}

async fn poll_loop<F>(
    source: Arc<dyn StatusSource>,
    interval: Duration,
    id: ActionId,
    cancel: CancellationToken,
    state_tx: watch::Sender<PollState>,
    on_done: F,
) where
    F: FnOnce() + Send + 'static,
{
    info!(action_id = %id, "status polling started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = source.status(&id) => result,
        };

        match result {
            Ok(ActionStatus::Done) => {
                state_tx.send_replace(PollState::Done);
                info!(action_id = %id, "action done");
                on_done();
                return;
            }
            Ok(status) => debug!(action_id = %id, ?status, "action not done yet"),
            Err(e) => warn!(action_id = %id, error = %e, "status query failed; will retry"),
        }
    }

    debug!(action_id = %id, "status polling cancelled");
    state_tx.send_replace(PollState::Idle);
}

/// Owner handle for one polling loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct PollHandle {
    action_id: Option<ActionId>,
    cancel: CancellationToken,
    state: watch::Receiver<PollState>,
}

impl PollHandle {
    /// A handle that watches nothing.
    pub fn idle() -> Self {
        let (_tx, state) = watch::channel(PollState::Idle);
        Self {
            action_id: None,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// The watched id, if any.
    pub fn action_id(&self) -> Option<&ActionId> {
        self.action_id.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Stop polling. No further queries are issued and `on_done` will not run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) was called (or the handle is being dropped).
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the loop reaches `Done` or stops for another reason.
    ///
    /// Returns the final state. An idle handle returns immediately.
    pub async fn wait_done(&mut self) -> PollState {
        let result = self
            .state
            .wait_for(|state| *state != PollState::Pending)
            .await
            .map(|state| *state);
        match result {
            Ok(state) => state,
            Err(_) => *self.state.borrow(),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
