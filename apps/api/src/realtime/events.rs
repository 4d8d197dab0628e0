use serde::Deserialize;

/// Label of the data channel carrying structured session events.
pub const EVENT_CHANNEL: &str = "oai-events";

/// Events the channel reacts to. Everything else on the wire is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    CandidateSpeechStarted,
    CandidateSpeechStopped,
    InterviewerAudioDelta,
    InterviewerResponseDone,
    InterviewerTranscript(String),
    CandidateTranscript(String),
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    transcript: Option<String>,
}

impl RealtimeEvent {
    /// Parses one event message. Returns `None` for unknown types, malformed
    /// JSON and transcript events without text.
    pub fn parse(raw: &str) -> Option<Self> {
        let event: WireEvent = serde_json::from_str(raw).ok()?;
        let transcript = || {
            event
                .transcript
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };

        match event.kind.as_str() {
            "input_audio_buffer.speech_started" => Some(Self::CandidateSpeechStarted),
            "input_audio_buffer.speech_stopped" => Some(Self::CandidateSpeechStopped),
            "response.audio.delta" => Some(Self::InterviewerAudioDelta),
            "response.done" => Some(Self::InterviewerResponseDone),
            "response.audio_transcript.done" => transcript().map(Self::InterviewerTranscript),
            "conversation.item.input_audio_transcription.completed" => {
                transcript().map(Self::CandidateTranscript)
            }
            _ => None,
        }
    }
}
