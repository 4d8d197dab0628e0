//! Speech Capture Pipeline: records one candidate answer and transcribes it.
//!
//! State machine: `Idle → Recording → Transcribing → Idle`.
//! The microphone is held only while `Recording` and is released through a
//! drop guard on every exit path. A background task buffers frames and
//! publishes a 32-bucket spectrum about 60 times a second; it is cancelled
//! before the microphone handle is released.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::llm_client::LlmError;
use crate::speech::spectrum::{Spectrum, SpectrumAnalyzer, BUCKETS};
use crate::speech::{encode_wav, Microphone, MicrophoneError, MicrophoneGuard, Transcriber};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const RECORDING_FILE_NAME: &str = "recording.wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Recording,
    Transcribing,
}

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Microphone(#[from] MicrophoneError),

    #[error("Transcription failed: {0}")]
    Transcription(String),
}

impl From<LlmError> for CaptureError {
    fn from(err: LlmError) -> Self {
        CaptureError::Transcription(err.to_string())
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Microphone(e) => e.into(),
            CaptureError::Transcription(msg) => AppError::ServiceUnavailable(msg),
        }
    }
}

struct RecordedAudio {
    chunks: Vec<Vec<f32>>,
    sample_rate: u32,
}

struct Recording {
    cancel: CancellationToken,
    task: JoinHandle<RecordedAudio>,
}

pub struct SpeechCapture {
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn Transcriber>,
    state: watch::Sender<CaptureState>,
    spectrum: Arc<watch::Sender<Spectrum>>,
    last_error: StdMutex<Option<CaptureError>>,
    recording: Mutex<Option<Recording>>,
}

impl SpeechCapture {
    pub fn new(microphone: Arc<dyn Microphone>, transcriber: Arc<dyn Transcriber>) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        let (spectrum, _) = watch::channel([0.0; BUCKETS]);
        Self {
            microphone,
            transcriber,
            state,
            spectrum: Arc::new(spectrum),
            last_error: StdMutex::new(None),
            recording: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Live visualization data. Reset to zeros when recording stops.
    pub fn subscribe_spectrum(&self) -> watch::Receiver<Spectrum> {
        self.spectrum.subscribe()
    }

    /// The error from the most recent start or stop, if it failed.
    pub fn last_error(&self) -> Option<CaptureError> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    fn set_error(&self, err: Option<CaptureError>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = err;
        }
    }

    /// Opens the microphone and starts buffering.
    ///
    /// A device failure leaves the pipeline `Idle` with the cause recorded in
    /// `last_error`; it is also returned for callers that want it inline.
    /// Calling while already recording or transcribing does nothing.
    pub async fn start_listening(&self) -> Result<(), CaptureError> {
        let mut recording = self.recording.lock().await;
        if self.state() != CaptureState::Idle {
            debug!("start_listening ignored in state {:?}", self.state());
            return Ok(());
        }
        self.set_error(None);

        let stream = match self.microphone.open().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Microphone unavailable: {e}");
                let err = CaptureError::from(e);
                self.set_error(Some(err.clone()));
                return Err(err);
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(record(
            MicrophoneGuard::new(stream),
            cancel.clone(),
            self.spectrum.clone(),
        ));
        *recording = Some(Recording { cancel, task });
        self.state.send_replace(CaptureState::Recording);
        info!("Recording started");
        Ok(())
    }

    /// Stops recording and transcribes what was captured.
    ///
    /// Returns `Ok(None)` when nothing was recorded (or when called while
    /// idle); no transcription request is made in that case.
    pub async fn stop_listening(&self) -> Result<Option<String>, CaptureError> {
        let mut slot = self.recording.lock().await;
        let Some(Recording { cancel, task }) = slot.take() else {
            return Ok(None);
        };

        cancel.cancel();
        let audio = match task.await {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Recording task aborted: {e}");
                RecordedAudio {
                    chunks: Vec::new(),
                    sample_rate: 0,
                }
            }
        };

        if audio.chunks.is_empty() {
            debug!("No audio captured; skipping transcription");
            self.state.send_replace(CaptureState::Idle);
            return Ok(None);
        }

        self.state.send_replace(CaptureState::Transcribing);
        let wav = encode_wav(&audio.chunks, audio.sample_rate);
        debug!(
            "Transcribing {} chunks ({} bytes)",
            audio.chunks.len(),
            wav.len()
        );

        let result = self
            .transcriber
            .transcribe(wav, RECORDING_FILE_NAME)
            .await
            .map_err(CaptureError::from);
        self.state.send_replace(CaptureState::Idle);

        match result {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                warn!("{e}");
                self.set_error(Some(e.clone()));
                Err(e)
            }
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        if let Some(recording) = self.recording.get_mut().take() {
            recording.cancel.cancel();
        }
    }
}

async fn record(
    mut mic: MicrophoneGuard,
    cancel: CancellationToken,
    spectrum: Arc<watch::Sender<Spectrum>>,
) -> RecordedAudio {
    let sample_rate = mic.stream().sample_rate();
    let mut chunks = Vec::new();
    let mut analyzer = SpectrumAnalyzer::new();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = mic.stream().next_frame() => match frame {
                Some(frame) => {
                    analyzer.push(&frame);
                    chunks.push(frame);
                }
                None => {
                    debug!("Microphone stream ended");
                    break;
                }
            },
            _ = ticker.tick() => {
                spectrum.send_replace(analyzer.snapshot());
            }
        }
    }

    drop(mic);
    spectrum.send_replace([0.0; BUCKETS]);
    RecordedAudio {
        chunks,
        sample_rate,
    }
}
