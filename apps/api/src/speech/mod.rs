//! Speech pipelines for the discrete-turn modality.
//!
//! `capture` records one answer and hands it to a `Transcriber`;
//! `playback` renders interviewer text through a `Synthesizer` and an
//! `AudioSink`. Device access sits behind the `Microphone` trait so the same
//! pipelines run against real hardware in an embedding client and against
//! fakes in tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::errors::AppError;
use crate::llm_client::{LlmClient, LlmError};

pub mod capture;
pub mod handlers;
pub mod playback;
pub mod spectrum;

/// Why a microphone could not be opened. Each cause gets its own message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum MicrophoneError {
    #[error("Microphone permission denied. Please allow microphone access and try again.")]
    PermissionDenied,

    #[error("No microphone found. Please connect a microphone and try again.")]
    NotFound,

    #[error("Microphone is being used by another application. Please close it and try again.")]
    Busy,

    #[error("Microphone access failed: {0}")]
    Other(String),
}

impl From<MicrophoneError> for AppError {
    fn from(err: MicrophoneError) -> Self {
        match err {
            MicrophoneError::PermissionDenied => AppError::PermissionDenied,
            other => AppError::DeviceUnavailable(other.to_string()),
        }
    }
}

/// Grants exclusive access to an input device.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self) -> Result<Box<dyn MicrophoneStream>, MicrophoneError>;
}

/// An open input device producing mono f32 PCM frames.
#[async_trait]
pub trait MicrophoneStream: Send {
    fn sample_rate(&self) -> u32;

    /// Next block of samples, or `None` once the device stops delivering.
    async fn next_frame(&mut self) -> Option<Vec<f32>>;

    /// Releases the device. Must be safe to call more than once.
    fn close(&mut self);
}

/// Closes the wrapped stream when dropped, whatever path the owner leaves by.
pub struct MicrophoneGuard(Box<dyn MicrophoneStream>);

impl MicrophoneGuard {
    pub fn new(stream: Box<dyn MicrophoneStream>) -> Self {
        Self(stream)
    }

    pub fn stream(&mut self) -> &mut dyn MicrophoneStream {
        self.0.as_mut()
    }
}

impl Drop for MicrophoneGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl Transcriber for LlmClient {
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, LlmError> {
        LlmClient::transcribe(self, audio, file_name).await
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Bytes, LlmError>;
}

#[async_trait]
impl Synthesizer for LlmClient {
    async fn synthesize(&self, text: &str) -> Result<Bytes, LlmError> {
        LlmClient::synthesize(self, text, None).await
    }
}

/// Encodes mono f32 samples as a 16-bit PCM WAV file.
pub fn encode_wav(chunks: &[Vec<f32>], sample_rate: u32) -> Bytes {
    let num_samples: usize = chunks.iter().map(Vec::len).sum();
    let data_len = (num_samples * 2) as u32;

    let mut buf = Vec::with_capacity(44 + data_len as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &sample in chunks.iter().flatten() {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&value.to_le_bytes());
    }
    Bytes::from(buf)
}
