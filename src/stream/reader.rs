//! Streaming chat reader.
//!
//! [`EventStreamReader::open`] posts one message and reads the
//! `text/event-stream` reply on a background task, invoking the caller's
//! [`StreamCallbacks`] as records arrive. The returned [`StreamHandle`]
//! cancels the read and resolves once the stream settles.

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{StreamEvent, StreamEventKind};
use super::sse::{SseLineDecoder, record_payload};
use crate::config::StreamConfig;
use crate::error::{ChatError, Result};

type MessageFn = Box<dyn FnMut(StreamEvent) + Send>;
type DoneFn = Box<dyn FnOnce() + Send>;
type ErrorFn = Box<dyn FnOnce(&ChatError) + Send>;

/// Caller hooks for one stream. Unset hooks are skipped.
///
/// `on_done` and `on_error` are mutually exclusive and fire at most once.
#[derive(Default)]
pub struct StreamCallbacks {
    on_message: Option<MessageFn>,
    on_done: Option<DoneFn>,
    on_error: Option<ErrorFn>,
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_message", &self.on_message.is_some())
            .field("on_done", &self.on_done.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl StreamCallbacks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for each `message` event with a non-empty answer.
    pub fn on_message(mut self, f: impl FnMut(StreamEvent) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// Called on `message_end` or a clean end of stream.
    pub fn on_done(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }

    /// Called on an `error` event, a failed connection or a broken read.
    pub fn on_error(mut self, f: impl FnOnce(&ChatError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn message(&mut self, event: StreamEvent) {
        if let Some(f) = self.on_message.as_mut() {
            f(event);
        }
    }

    fn done(&mut self) {
        self.on_error = None;
        if let Some(f) = self.on_done.take() {
            f();
        }
    }

    fn error(&mut self, err: &ChatError) {
        self.on_done = None;
        if let Some(f) = self.on_error.take() {
            f(err);
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    message: &'a str,
    #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

/// Opens chat streams against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct EventStreamReader {
    base_url: String,
    endpoint: String,
    client: reqwest::Client,
}

impl EventStreamReader {
    /// Reader for `<stream.base_url>/<stream.endpoint>`.
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            endpoint: config.endpoint.trim_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Same base URL, different endpoint name.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        self.endpoint = endpoint.trim_matches('/').to_owned();
        self
    }

    /// URL streams are posted to.
    pub fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.endpoint)
    }

    /// Post `message` and read the reply stream in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        callbacks: StreamCallbacks,
    ) -> StreamHandle {
        let url = self.url();
        info!(
            url = %url,
            conversation_id = conversation_id.unwrap_or(""),
            message_chars = message.chars().count(),
            "opening event stream"
        );
        let request = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&StreamRequest {
                message,
                conversation_id,
            });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_stream(request, cancel.clone(), callbacks));
        StreamHandle { cancel, task }
    }

    /// Run the workflow endpoint once and return its JSON body.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses and non-JSON bodies.
    pub async fn execute_workflow(&self, query: &str) -> Result<Value> {
        let url = format!("{}/workflow", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Accept", "*/*")
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("workflow request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "workflow request rejected");
            return Err(ChatError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ChatError::ParseError(format!("workflow body is not JSON: {e}")))
    }
}

/// Handle on a stream being read in the background.
///
/// Dropping the handle detaches the read; call [`cancel`](Self::cancel) to stop it.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl StreamHandle {
    /// Abort the read. No callbacks run afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this stream, for wiring into a parent shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the background read has settled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stream to settle.
    ///
    /// # Errors
    ///
    /// The error passed to `on_error`, or [`ChatError::Cancelled`] after
    /// [`cancel`](Self::cancel).
    pub async fn completion(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ChatError::StreamError(format!("stream task failed: {e}"))),
        }
    }
}

fn cancelled() -> ChatError {
    ChatError::Cancelled("stream aborted".to_owned())
}

async fn run_stream(
    request: reqwest::RequestBuilder,
    cancel: CancellationToken,
    mut callbacks: StreamCallbacks,
) -> Result<()> {
    let sent = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(cancelled()),
        sent = request.send() => sent,
    };

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            let err = ChatError::RequestError(format!("stream connection failed: {e}"));
            warn!(error = %err, "event stream connection failed");
            callbacks.error(&err);
            return Err(err);
        }
    };

    let status = response.status();
    debug!(status = status.as_u16(), "event stream connected");
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let err = ChatError::UpstreamError {
            status: status.as_u16(),
            body,
        };
        warn!(error = %err, "event stream rejected");
        callbacks.error(&err);
        return Err(err);
    }

    read_events(response.bytes_stream(), &cancel, &mut callbacks).await
}

enum Flow {
    Continue,
    Stop(Result<()>),
}

/// Drive `callbacks` from a chunked SSE body until a terminal event, the
/// end of the body, or cancellation.
///
/// # Errors
///
/// [`ChatError::StreamError`] for an `error` event or a failed chunk read,
/// [`ChatError::Cancelled`] when `cancel` fires.
pub async fn read_events<S, B, E>(
    stream: S,
    cancel: &CancellationToken,
    callbacks: &mut StreamCallbacks,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseLineDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let lines = decoder.push(chunk.as_ref());
                debug!(lines = lines.len(), bytes = chunk.as_ref().len(), "stream chunk");
                for line in lines {
                    if cancel.is_cancelled() {
                        return Err(cancelled());
                    }
                    if let Flow::Stop(result) = handle_line(&line, callbacks) {
                        return result;
                    }
                }
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return Err(cancelled());
                }
                let err = ChatError::StreamError(format!("stream read failed: {e}"));
                warn!(error = %err, "event stream broke");
                callbacks.error(&err);
                return Err(err);
            }
            None => break,
        }
    }

    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    if let Some(line) = decoder.flush()
        && let Flow::Stop(result) = handle_line(&line, callbacks)
    {
        return result;
    }

    debug!("event stream ended without message_end");
    callbacks.done();
    Ok(())
}

fn handle_line(line: &str, callbacks: &mut StreamCallbacks) -> Flow {
    let Some(payload) = record_payload(line) else {
        return Flow::Continue;
    };
    if payload.trim().is_empty() {
        return Flow::Continue;
    }

    let event: StreamEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, raw = payload, "skipping malformed stream record");
            return Flow::Continue;
        }
    };
    debug!(
        event = ?event.event,
        has_answer = event.answer_text().is_some(),
        message_id = event.message_id.as_deref().unwrap_or(""),
        "stream record"
    );

    match event.event {
        StreamEventKind::Message if event.answer_text().is_some() => {
            callbacks.message(event);
            Flow::Continue
        }
        StreamEventKind::MessageEnd => {
            info!(total_tokens = event.total_tokens(), "event stream completed");
            callbacks.done();
            Flow::Stop(Ok(()))
        }
        StreamEventKind::Error => {
            let message = event
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Unknown error".to_owned());
            let err = ChatError::StreamError(message);
            warn!(error = %err, code = event.code.as_deref().unwrap_or(""), "event stream error");
            callbacks.error(&err);
            Flow::Stop(Err(err))
        }
        _ => Flow::Continue,
    }
}
