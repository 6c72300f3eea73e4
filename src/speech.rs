//! Speech input and output.
//!
//! Recognition and synthesis engines are collaborators; the front-end only
//! needs a stream of recognized text and a way to speak a reply. [`AutoSubmit`]
//! turns a burst of recognition results into a single submission once the
//! speaker pauses.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;

/// Speech recognition and synthesis.
#[async_trait]
pub trait SpeechIo: Send + Sync {
    /// Start recognizing. Each item is the latest transcript of the current
    /// utterance; the channel closes when recognition stops.
    fn recognize(&self) -> mpsc::Receiver<String>;

    /// Speak `text` until finished or cancelled.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Stop whatever is being spoken.
    fn cancel_speech(&self);
}

/// Recognizes nothing and writes spoken text to the log.
#[derive(Debug, Clone)]
pub struct NoopSpeech {
    lang: String,
}

impl NoopSpeech {
    /// Silent speech for `lang`.
    pub fn new(lang: impl Into<String>) -> Self {
        Self { lang: lang.into() }
    }
}

#[async_trait]
impl SpeechIo for NoopSpeech {
    fn recognize(&self) -> mpsc::Receiver<String> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }

    async fn speak(&self, text: &str) -> Result<()> {
        info!(lang = %self.lang, text, "speak");
        Ok(())
    }

    fn cancel_speech(&self) {
        debug!("cancel speech");
    }
}

/// Replays fixed utterances and records everything spoken.
#[derive(Debug, Default)]
pub struct ScriptedSpeech {
    utterances: Mutex<Vec<String>>,
    spoken: Mutex<Vec<String>>,
    cancels: AtomicUsize,
}

impl ScriptedSpeech {
    /// Speech that will "hear" `utterances` in order on the first `recognize`.
    pub fn new<I, S>(utterances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            utterances: Mutex::new(utterances.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Everything passed to `speak` so far.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .map(|spoken| spoken.clone())
            .unwrap_or_default()
    }

    /// Number of `cancel_speech` calls.
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechIo for ScriptedSpeech {
    fn recognize(&self) -> mpsc::Receiver<String> {
        let utterances = self
            .utterances
            .lock()
            .map(|mut u| std::mem::take(&mut *u))
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(utterances.len().max(1));
        for text in utterances {
            let _ = tx.try_send(text);
        }
        rx
    }

    async fn speak(&self, text: &str) -> Result<()> {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_owned());
        }
        Ok(())
    }

    fn cancel_speech(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Debounces recognition results into submissions.
///
/// Each [`push`](Self::push) restarts the timer. When the timer expires the
/// latest text is sent on the receiver returned by [`new`](Self::new), unless
/// it is blank. Whether the session can accept it is the consumer's call.
#[derive(Debug)]
pub struct AutoSubmit {
    delay: Duration,
    tx: mpsc::Sender<String>,
    pending: Option<JoinHandle<()>>,
}

impl AutoSubmit {
    /// Debouncer with the given quiet period, and the receiving end for its output.
    pub fn new(delay: Duration) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(4);
        (
            Self {
                delay,
                tx,
                pending: None,
            },
            rx,
        )
    }

    /// Record the latest transcript and restart the timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn push(&mut self, text: impl Into<String>) {
        self.cancel();
        let text: String = text.into();
        let delay = self.delay;
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if text.trim().is_empty() {
                return;
            }
            debug!(chars = text.chars().count(), "auto-submitting transcript");
            let _ = tx.send(text).await;
        }));
    }

    /// Drop the pending transcript, if any.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }

    /// Whether a transcript is waiting for its timer.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.is_finished())
    }
}

impl Drop for AutoSubmit {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    const DELAY: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn burst_submits_only_the_last_text() {
        let (mut auto, mut rx) = AutoSubmit::new(DELAY);
        auto.push("ロボ");
        tokio::time::sleep(Duration::from_millis(5)).await;
        auto.push("ロボット");
        tokio::time::sleep(Duration::from_millis(5)).await;
        auto.push("ロボットさん、手を振って");
        assert!(auto.is_pending());

        let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "ロボットさん、手を振って");

        tokio::time::sleep(DELAY * 2).await;
        assert!(rx.try_recv().is_err());
        assert!(!auto.is_pending());
    }

    #[tokio::test]
    async fn blank_text_is_not_submitted() {
        let (mut auto, mut rx) = AutoSubmit::new(DELAY);
        auto.push("   ");
        tokio::time::sleep(DELAY * 3).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_drops_pending_text() {
        let (mut auto, mut rx) = AutoSubmit::new(DELAY);
        auto.push("wave");
        auto.cancel();
        assert!(!auto.is_pending());
        tokio::time::sleep(DELAY * 3).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drop_cancels_timer() {
        let (mut auto, mut rx) = AutoSubmit::new(DELAY);
        auto.push("wave");
        drop(auto);
        let next = tokio::time::timeout(DELAY * 3, rx.recv()).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn scripted_speech_replays_and_records() {
        let speech = ScriptedSpeech::new(["hello", "wave"]);
        let mut rx = speech.recognize();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx.recv().await.as_deref(), Some("wave"));
        assert!(rx.recv().await.is_none());
        assert!(speech.recognize().recv().await.is_none());

        speech.cancel_speech();
        speech.speak("はい").await.unwrap();
        assert_eq!(speech.spoken(), vec!["はい"]);
        assert_eq!(speech.cancel_count(), 1);
    }

    #[tokio::test]
    async fn noop_speech_recognizes_nothing() {
        let speech = NoopSpeech::new("ja-JP");
        assert!(speech.recognize().recv().await.is_none());
        speech.speak("hello").await.unwrap();
    }
}
