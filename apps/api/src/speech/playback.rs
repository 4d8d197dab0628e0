//! Speech Playback Pipeline: renders interviewer text as audio.
//!
//! At most one synthesis request and one playback are in flight per
//! pipeline. Each `speak` call takes a fresh generation number and
//! cancellation token under one lock; a newer call (or `stop`) cancels the
//! older one, and only the current generation may fire `on_ready` and start
//! the sink.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::speech::Synthesizer;

#[derive(Debug, Clone, Error)]
#[error("Audio playback failed: {0}")]
pub struct PlaybackError(pub String);

impl From<PlaybackError> for AppError {
    fn from(err: PlaybackError) -> Self {
        AppError::DeviceUnavailable(err.to_string())
    }
}

/// Output device.
pub trait AudioSink: Send + Sync {
    /// Begins playback and returns without waiting for it to finish. The
    /// receiver resolves, or is dropped, once the audio has ended.
    fn start(&self, audio: Bytes) -> Result<oneshot::Receiver<()>, PlaybackError>;

    /// Halts whatever is playing.
    fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Synthesizing,
    Playing,
}

/// How a `speak` call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Playing,
    /// A newer `speak` or a `stop` took over before audio was ready.
    Superseded,
}

struct Current {
    generation: u64,
    token: CancellationToken,
}

pub struct SpeechPlayback {
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    current: Arc<Mutex<Current>>,
    state: Arc<watch::Sender<PlaybackState>>,
}

impl SpeechPlayback {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            synthesizer,
            sink,
            current: Arc::new(Mutex::new(Current {
                generation: 0,
                token: CancellationToken::new(),
            })),
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Supersedes whatever is in flight and claims the next generation.
    fn begin(&self) -> (u64, CancellationToken) {
        let mut current = self.lock();
        current.generation += 1;
        let token = CancellationToken::new();
        std::mem::replace(&mut current.token, token.clone()).cancel();
        self.sink.stop();
        self.state.send_replace(PlaybackState::Synthesizing);
        (current.generation, token)
    }

    /// Synthesizes `text` and plays it, calling `on_ready` just before
    /// playback starts.
    ///
    /// A synthesis failure is returned and `on_ready` is not called.
    pub async fn speak<F>(&self, text: &str, on_ready: F) -> Result<SpeakOutcome, AppError>
    where
        F: FnOnce() + Send,
    {
        let (generation, token) = self.begin();

        let audio = tokio::select! {
            _ = token.cancelled() => {
                debug!("Synthesis for generation {generation} cancelled");
                return Ok(SpeakOutcome::Superseded);
            }
            result = self.synthesizer.synthesize(text) => result,
        };

        let done = {
            let current = self.lock();
            if current.generation != generation {
                return Ok(SpeakOutcome::Superseded);
            }
            let audio = match audio {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("Speech synthesis failed: {e}");
                    self.state.send_replace(PlaybackState::Idle);
                    return Err(e.into());
                }
            };

            on_ready();
            match self.sink.start(audio) {
                Ok(done) => {
                    self.state.send_replace(PlaybackState::Playing);
                    done
                }
                Err(e) => {
                    self.state.send_replace(PlaybackState::Idle);
                    return Err(e.into());
                }
            }
        };

        self.watch_completion(generation, done);
        Ok(SpeakOutcome::Playing)
    }

    /// Returns to `Idle` when the audio ends, unless a newer call took over.
    fn watch_completion(&self, generation: u64, done: oneshot::Receiver<()>) {
        let current = self.current.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            done.await.ok();
            let current = current.lock().unwrap_or_else(PoisonError::into_inner);
            if current.generation == generation {
                debug!("Playback for generation {generation} finished");
                state.send_replace(PlaybackState::Idle);
            }
        });
    }

    /// Cancels any pending synthesis and halts playback. Safe in any state.
    pub fn stop(&self) {
        let mut current = self.lock();
        current.generation += 1;
        current.token.cancel();
        self.sink.stop();
        self.state.send_replace(PlaybackState::Idle);
    }
}
