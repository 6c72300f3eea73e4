//! Terminal chat front-end.
//!
//! Plays the role of the chat page: take a line (typed or recognized),
//! submit it, speak and print the reply, then hold further input until the
//! robot reports the action done.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{ActionId, ActionSession, StatusPoller};
use crate::client::RobotChatClient;
use crate::config::RobotChatConfig;
use crate::error::{ChatError, Result};
use crate::orchestrator::RobotReply;
use crate::speech::{AutoSubmit, SpeechIo};

const DEFAULT_AUTO_SUBMIT_DELAY: Duration = Duration::from_millis(500);

enum Input {
    Line(Option<String>),
    Heard(Option<String>),
    AutoSubmit(Option<String>),
    ActionDone(Option<ActionId>),
    Cancelled,
}

/// Interactive client session against the boundary server.
pub struct ChatFrontend<S: SpeechIo + 'static> {
    client: RobotChatClient,
    speech: Arc<S>,
    session: ActionSession,
    auto_submit_delay: Duration,
    done_tx: mpsc::UnboundedSender<ActionId>,
    done_rx: mpsc::UnboundedReceiver<ActionId>,
}

impl<S: SpeechIo + 'static> std::fmt::Debug for ChatFrontend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatFrontend")
            .field("client", &self.client)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<S: SpeechIo + 'static> ChatFrontend<S> {
    /// Front-end over `client`, polling status through the server's proxy route.
    pub fn new(client: RobotChatClient, speech: Arc<S>) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let poller = StatusPoller::new(Arc::new(client.clone()));
        Self {
            client,
            speech,
            session: ActionSession::new(poller),
            auto_submit_delay: DEFAULT_AUTO_SUBMIT_DELAY,
            done_tx,
            done_rx,
        }
    }

    /// Front-end with poll interval and auto-submit delay taken from `config`.
    pub fn from_config(client: RobotChatClient, speech: Arc<S>, config: &RobotChatConfig) -> Self {
        Self::new(client, speech)
            .with_poll_interval(config.action.poll_interval())
            .with_auto_submit_delay(config.speech.auto_submit_delay())
    }

    /// Override the status poll interval. Resets the session.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let poller = StatusPoller::new(Arc::new(self.client.clone())).with_interval(interval);
        self.session = ActionSession::new(poller);
        self
    }

    /// Override the auto-submit quiet period.
    pub fn with_auto_submit_delay(mut self, delay: Duration) -> Self {
        self.auto_submit_delay = delay;
        self
    }

    /// The action context.
    pub fn session(&self) -> &ActionSession {
        &self.session
    }

    /// Whether input is currently refused.
    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    /// Submit one query and start tracking its action.
    ///
    /// The previous reply and poller are discarded first. On success the
    /// reply is spoken (cutting off any earlier reply) in the background.
    ///
    /// # Errors
    ///
    /// Whatever the server or transport reported; the session is left idle.
    pub async fn send_query(&mut self, query: &str) -> Result<RobotReply> {
        self.session.begin_request();

        let reply = match self.client.submit(query).await {
            Ok(reply) => reply,
            Err(e) => {
                self.session.fail_request();
                return Err(e);
            }
        };

        self.speech.cancel_speech();
        let speech = Arc::clone(&self.speech);
        let text = reply.reply.chat.clone();
        tokio::spawn(async move {
            if let Err(e) = speech.speak(&text).await {
                warn!(error = %e, "speech synthesis failed");
            }
        });

        let done_tx = self.done_tx.clone();
        let id = reply.action_id.clone();
        self.session
            .track(reply.reply.clone(), reply.action_id.clone(), move || {
                let _ = done_tx.send(id);
            });
        Ok(reply)
    }

    /// Read lines from `input` and recognized speech until EOF or `cancel`.
    ///
    /// # Errors
    ///
    /// Only terminal I/O failures end the loop with an error; request
    /// failures are printed and the loop continues.
    pub async fn run<R, W>(&mut self, input: R, mut output: W, cancel: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut heard = self.speech.recognize();
        let mut listening = true;
        let (mut auto, mut auto_rx) = AutoSubmit::new(self.auto_submit_delay);

        write_line(&mut output, "ready").await?;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => Input::Cancelled,
                line = lines.next_line() => Input::Line(line?),
                text = heard.recv(), if listening => Input::Heard(text),
                text = auto_rx.recv() => Input::AutoSubmit(text),
                id = self.done_rx.recv() => Input::ActionDone(id),
            };

            match next {
                Input::Cancelled | Input::Line(None) => break,
                Input::Line(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    auto.cancel();
                    self.submit_and_print(line, &mut output).await?;
                }
                Input::Heard(Some(text)) => {
                    debug!(text = %text, "recognized");
                    auto.push(text);
                }
                Input::Heard(None) => {
                    debug!("speech recognition ended");
                    listening = false;
                }
                Input::AutoSubmit(Some(text)) => {
                    self.submit_and_print(&text, &mut output).await?;
                }
                Input::AutoSubmit(None) | Input::ActionDone(None) => {}
                Input::ActionDone(Some(id)) => {
                    info!(action_id = %id, "robot finished");
                    write_line(&mut output, &format!("[action {id} done]")).await?;
                }
            }
        }

        auto.cancel();
        self.speech.cancel_speech();
        Ok(())
    }

    async fn submit_and_print<W>(&mut self, query: &str, output: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if self.is_busy() {
            warn!(query, "input refused while the robot is busy");
            return write_line(output, "[busy: waiting for the robot]").await;
        }

        write_line(output, &format!("you> {query}")).await?;
        match self.send_query(query).await {
            Ok(reply) => {
                write_line(output, &format!("robot> {}", reply.reply.chat)).await?;
                if reply.has_action() {
                    let act = reply
                        .reply
                        .act
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    write_line(output, &format!("[action {} sent: {act}]", reply.action_id))
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "chat turn failed");
                write_line(output, &format!("[error: {}]", describe(&e))).await
            }
        }
    }
}

fn describe(err: &ChatError) -> String {
    match err {
        ChatError::UpstreamError { status, body } => {
            let detail = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
                .unwrap_or_else(|| body.clone());
            format!("HTTP {status}: {detail}")
        }
        other => other.message().to_owned(),
    }
}

async fn write_line<W>(output: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
