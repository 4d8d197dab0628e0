//! Conversation drivers: the two interview modalities behind one interface.
//!
//! Both produce the same artifact, an ordered `Message` sequence. The
//! discrete-turn driver runs the turn engine through the capture and
//! playback pipelines; the realtime driver runs a `RealtimeChannel` and
//! takes its transcript from the channel's event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::interview::engine::InterviewEngine;
use crate::interview::prompts::{build_instructions, TurnKind};
use crate::models::context::InterviewContext;
use crate::models::session::Message;
use crate::realtime::channel::RealtimeChannel;
use crate::speech::capture::SpeechCapture;
use crate::speech::playback::{SpeakOutcome, SpeechPlayback};

#[async_trait]
pub trait ConversationDriver: Send + Sync {
    /// Starts the conversation for a fully assembled context.
    async fn begin(&self, context: InterviewContext) -> Result<(), AppError>;

    /// The transcript as the candidate currently sees it.
    fn transcript(&self) -> Vec<Message>;

    /// Tears the conversation down and returns the final transcript.
    async fn finish(&self) -> Result<Vec<Message>, AppError>;
}

/// Push-to-talk modality.
///
/// Interviewer messages become visible only when their audio is about to
/// play. When synthesis fails the message is shown as text only. Once
/// `finish` runs the visible transcript is frozen.
pub struct TurnDriver {
    engine: Mutex<InterviewEngine>,
    capture: Arc<SpeechCapture>,
    playback: Arc<SpeechPlayback>,
    visible: watch::Sender<Vec<Message>>,
    finished: AtomicBool,
}

impl TurnDriver {
    pub fn new(
        engine: InterviewEngine,
        capture: Arc<SpeechCapture>,
        playback: Arc<SpeechPlayback>,
    ) -> Self {
        Self {
            engine: Mutex::new(engine),
            capture,
            playback,
            visible: watch::channel(Vec::new()).0,
            finished: AtomicBool::new(false),
        }
    }

    pub fn subscribe_transcript(&self) -> watch::Receiver<Vec<Message>> {
        self.visible.subscribe()
    }

    pub fn capture(&self) -> &SpeechCapture {
        &self.capture
    }

    /// Appends to the visible transcript unless it has been frozen.
    ///
    /// The flag is read under the channel's lock, so a push racing `finish`
    /// either lands before the frozen transcript replaces it or not at all.
    fn show(&self, message: Message) {
        self.visible.send_if_modified(|t| {
            if self.finished.load(Ordering::SeqCst) {
                return false;
            }
            t.push(message);
            true
        });
    }

    async fn present(&self, message: Message) {
        let shown = message.clone();
        let outcome = self
            .playback
            .speak(&message.text, || self.show(shown))
            .await;

        match outcome {
            Ok(SpeakOutcome::Playing) => {}
            Ok(SpeakOutcome::Superseded) => {
                debug!("Playback superseded; showing interviewer text only");
                self.show(message);
            }
            Err(e) => {
                warn!("Falling back to text-only interviewer turn: {e}");
                self.show(message);
            }
        }
    }

    /// Interrupts the interviewer and opens the microphone.
    pub async fn start_answer(&self) -> Result<(), AppError> {
        self.playback.stop();
        self.capture.start_listening().await?;
        Ok(())
    }

    /// Closes the microphone and submits what was said.
    ///
    /// Returns `None` when nothing was recorded or the transcription was
    /// blank; no turn is sent in that case.
    pub async fn finish_answer(&self) -> Result<Option<Message>, AppError> {
        let Some(text) = self.capture.stop_listening().await? else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            debug!("Blank transcription; no turn sent");
            return Ok(None);
        }
        self.send_text(&text).await.map(Some)
    }

    /// Sends a typed answer. The candidate message is visible immediately.
    pub async fn send_text(&self, text: &str) -> Result<Message, AppError> {
        let mut engine = self.engine.lock().await;
        let before = engine.messages().len();
        let result = engine.send_turn(text).await;

        if engine.messages().len() > before {
            self.show(engine.messages()[before].clone());
        }
        drop(engine);

        let reply = result?;
        self.present(reply.clone()).await;
        Ok(reply)
    }
}

#[async_trait]
impl ConversationDriver for TurnDriver {
    async fn begin(&self, context: InterviewContext) -> Result<(), AppError> {
        let opening = self.engine.lock().await.start_interview(context).await?;
        self.present(opening).await;
        Ok(())
    }

    fn transcript(&self) -> Vec<Message> {
        self.visible.borrow().clone()
    }

    async fn finish(&self) -> Result<Vec<Message>, AppError> {
        self.finished.store(true, Ordering::SeqCst);
        self.playback.stop();
        if let Err(e) = self.capture.stop_listening().await {
            debug!("Discarding in-flight answer: {e}");
        }
        let finished = self.engine.lock().await.end_interview()?;
        self.visible.send_replace(finished.transcript.clone());
        Ok(finished.transcript)
    }
}

/// Continuous voice modality.
pub struct RealtimeDriver {
    channel: RealtimeChannel,
}

impl RealtimeDriver {
    pub fn new(channel: RealtimeChannel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }
}

#[async_trait]
impl ConversationDriver for RealtimeDriver {
    async fn begin(&self, context: InterviewContext) -> Result<(), AppError> {
        if context.role_title().is_none() {
            return Err(AppError::Validation("Role title is required".to_string()));
        }
        let instructions = build_instructions(&context, &[], TurnKind::Opening);
        self.channel.connect(&instructions).await
    }

    fn transcript(&self) -> Vec<Message> {
        self.channel.transcript()
    }

    async fn finish(&self) -> Result<Vec<Message>, AppError> {
        self.channel.disconnect().await;
        Ok(self.channel.transcript())
    }
}
