//! Realtime Voice Channel: continuous full-duplex voice session.
//!
//! State machine: `Disconnected → Connecting → Connected → (Disconnected | Error)`.
//! `connect` is accepted only from `Disconnected` or `Error`; there is no
//! automatic reconnect. The microphone and the peer connection are held for
//! the lifetime of a connection and are released together on `disconnect`,
//! on any negotiation failure and when the remote side closes the event
//! channel.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::llm_client::{LlmClient, LlmError, RealtimeSession};
use crate::models::session::Message;
use crate::realtime::events::{RealtimeEvent, EVENT_CHANNEL};
use crate::speech::{Microphone, MicrophoneError, MicrophoneGuard};

/// Credential and offer/answer negotiation with the reasoning service.
#[async_trait]
pub trait RealtimeNegotiator: Send + Sync {
    async fn create_session(&self, instructions: &str) -> Result<RealtimeSession, LlmError>;
    async fn exchange_sdp(&self, secret: &str, offer_sdp: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl RealtimeNegotiator for LlmClient {
    async fn create_session(&self, instructions: &str) -> Result<RealtimeSession, LlmError> {
        self.create_realtime_session(instructions).await
    }

    async fn exchange_sdp(&self, secret: &str, offer_sdp: &str) -> Result<String, LlmError> {
        LlmClient::exchange_sdp(self, secret, offer_sdp).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Peer connection failed: {0}")]
pub struct PeerError(pub String);

/// Creates peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PeerConnection>, PeerError>;
}

/// One peer-to-peer media connection. Session descriptions are opaque.
#[async_trait]
pub trait PeerConnection: Send {
    /// Opens a data channel; every message received on it is forwarded.
    fn open_data_channel(&mut self, label: &str) -> Result<mpsc::Receiver<String>, PeerError>;

    /// Adds the outgoing audio track.
    fn add_audio_track(&mut self) -> Result<mpsc::Sender<Vec<f32>>, PeerError>;

    async fn create_offer(&mut self) -> Result<String, PeerError>;
    async fn set_remote_answer(&mut self, answer_sdp: &str) -> Result<(), PeerError>;

    /// Must be safe to call more than once.
    fn close(&mut self);
}

struct PeerGuard(Box<dyn PeerConnection>);

impl Drop for PeerGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RealtimeErrorKind {
    #[error("Failed to get session token: {0}")]
    CredentialFetch(String),

    #[error("Invalid session response: missing client secret")]
    MissingCredential,

    #[error("{0}")]
    Microphone(MicrophoneError),

    #[error("Peer connection failed: {0}")]
    PeerConnection(String),

    #[error("Failed to connect to the realtime API: {0}")]
    Negotiation(String),

    #[error("Connection closed by the remote peer")]
    RemoteClosed,
}

impl From<RealtimeErrorKind> for AppError {
    fn from(kind: RealtimeErrorKind) -> Self {
        match kind {
            RealtimeErrorKind::Microphone(e) => e.into(),
            RealtimeErrorKind::MissingCredential => AppError::MalformedResponse(kind.to_string()),
            other => AppError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<PeerError> for RealtimeErrorKind {
    fn from(err: PeerError) -> Self {
        RealtimeErrorKind::PeerConnection(err.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Error(RealtimeErrorKind),
}

/// Flags and transcript shared with the background tasks.
struct Shared {
    state: watch::Sender<ChannelState>,
    transcript: watch::Sender<Vec<Message>>,
    candidate_speaking: watch::Sender<bool>,
    interviewer_speaking: watch::Sender<bool>,
}

impl Shared {
    fn apply(&self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::CandidateSpeechStarted => {
                self.candidate_speaking.send_replace(true);
            }
            RealtimeEvent::CandidateSpeechStopped => {
                self.candidate_speaking.send_replace(false);
            }
            RealtimeEvent::InterviewerAudioDelta => {
                if !*self.interviewer_speaking.borrow() {
                    self.interviewer_speaking.send_replace(true);
                }
            }
            RealtimeEvent::InterviewerResponseDone => {
                self.interviewer_speaking.send_replace(false);
            }
            RealtimeEvent::InterviewerTranscript(text) => {
                self.transcript
                    .send_modify(|t| t.push(Message::interviewer(text)));
            }
            RealtimeEvent::CandidateTranscript(text) => {
                self.transcript
                    .send_modify(|t| t.push(Message::candidate(text)));
            }
        }
    }

    fn reset_flags(&self) {
        self.candidate_speaking.send_replace(false);
        self.interviewer_speaking.send_replace(false);
    }
}

struct ActiveConnection {
    cancel: CancellationToken,
    peer: Arc<StdMutex<Option<PeerGuard>>>,
    uplink: JoinHandle<()>,
    events: JoinHandle<()>,
}

pub struct RealtimeChannel {
    negotiator: Arc<dyn RealtimeNegotiator>,
    connector: Arc<dyn PeerConnector>,
    microphone: Arc<dyn Microphone>,
    shared: Arc<Shared>,
    connection: Mutex<Option<ActiveConnection>>,
}

impl RealtimeChannel {
    pub fn new(
        negotiator: Arc<dyn RealtimeNegotiator>,
        connector: Arc<dyn PeerConnector>,
        microphone: Arc<dyn Microphone>,
    ) -> Self {
        let shared = Shared {
            state: watch::channel(ChannelState::Disconnected).0,
            transcript: watch::channel(Vec::new()).0,
            candidate_speaking: watch::channel(false).0,
            interviewer_speaking: watch::channel(false).0,
        };
        Self {
            negotiator,
            connector,
            microphone,
            shared: Arc::new(shared),
            connection: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Finalized messages from both parties, in arrival order.
    pub fn transcript(&self) -> Vec<Message> {
        self.shared.transcript.borrow().clone()
    }

    pub fn subscribe_transcript(&self) -> watch::Receiver<Vec<Message>> {
        self.shared.transcript.subscribe()
    }

    pub fn is_candidate_speaking(&self) -> bool {
        *self.shared.candidate_speaking.borrow()
    }

    pub fn is_interviewer_speaking(&self) -> bool {
        *self.shared.interviewer_speaking.borrow()
    }

    /// Negotiates a session and starts streaming.
    ///
    /// Any failure releases whatever was acquired, moves the channel to
    /// `Error(kind)` and returns the same kind.
    pub async fn connect(&self, instructions: &str) -> Result<(), AppError> {
        let mut slot = self.connection.lock().await;
        match self.state() {
            ChannelState::Disconnected | ChannelState::Error(_) => {}
            other => {
                return Err(AppError::InvalidState(format!(
                    "Cannot connect while {other:?}"
                )))
            }
        }

        if let Some(stale) = slot.take() {
            stale.cancel.cancel();
            stale.events.abort();
            release_peer(&stale.peer);
        }
        self.shared.state.send_replace(ChannelState::Connecting);
        debug!("Realtime channel connecting");

        match self.establish(instructions).await {
            Ok(connection) => {
                *slot = Some(connection);
                self.shared.state.send_replace(ChannelState::Connected);
                info!("Realtime channel connected");
                Ok(())
            }
            Err(kind) => {
                warn!("Realtime connection failed: {kind}");
                self.shared
                    .state
                    .send_replace(ChannelState::Error(kind.clone()));
                Err(kind.into())
            }
        }
    }

    async fn establish(&self, instructions: &str) -> Result<ActiveConnection, RealtimeErrorKind> {
        let session = self
            .negotiator
            .create_session(instructions)
            .await
            .map_err(|e| RealtimeErrorKind::CredentialFetch(e.to_string()))?;
        let secret = session
            .secret()
            .ok_or(RealtimeErrorKind::MissingCredential)?
            .to_string();

        let mut peer = PeerGuard(self.connector.connect().await?);
        let events_rx = peer.0.open_data_channel(EVENT_CHANNEL)?;

        let mut mic = MicrophoneGuard::new(
            self.microphone
                .open()
                .await
                .map_err(RealtimeErrorKind::Microphone)?,
        );
        let audio_tx = peer.0.add_audio_track()?;

        let offer = peer.0.create_offer().await?;
        let answer = self
            .negotiator
            .exchange_sdp(&secret, &offer)
            .await
            .map_err(|e| RealtimeErrorKind::Negotiation(e.to_string()))?;
        peer.0.set_remote_answer(&answer).await?;

        let cancel = CancellationToken::new();
        let peer = Arc::new(StdMutex::new(Some(peer)));

        let uplink = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        frame = mic.stream().next_frame() => match frame {
                            Some(frame) => {
                                if audio_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
                drop(mic);
                debug!("Microphone released");
            })
        };

        let events = tokio::spawn(run_events(
            events_rx,
            cancel.clone(),
            peer.clone(),
            self.shared.clone(),
        ));

        Ok(ActiveConnection {
            cancel,
            peer,
            uplink,
            events,
        })
    }

    /// Tears the session down. Safe to call in any state.
    pub async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.take() {
            connection.cancel.cancel();
            if let Err(e) = connection.uplink.await {
                warn!("Uplink task failed: {e}");
            }
            connection.events.abort();
            release_peer(&connection.peer);
        }
        self.shared.reset_flags();
        self.shared.state.send_replace(ChannelState::Disconnected);
        info!("Realtime channel disconnected");
    }
}

fn release_peer(peer: &StdMutex<Option<PeerGuard>>) {
    if let Ok(mut slot) = peer.lock() {
        slot.take();
    }
}

async fn run_events(
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
    peer: Arc<StdMutex<Option<PeerGuard>>>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            message = rx.recv() => match message {
                Some(raw) => match RealtimeEvent::parse(&raw) {
                    Some(event) => shared.apply(event),
                    None => debug!("Ignoring realtime event: {raw}"),
                },
                None => break,
            },
        }
    }

    warn!("Realtime event channel closed by remote peer");
    cancel.cancel();
    release_peer(&peer);
    shared.reset_flags();
    shared
        .state
        .send_replace(ChannelState::Error(RealtimeErrorKind::RemoteClosed));
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.cancel.cancel();
            connection.events.abort();
            release_peer(&connection.peer);
        }
    }
}
