use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Interviewer,
    Candidate,
}

/// A single turn. Insertion order is conversation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Speaker,
    pub text: String,
}

impl Message {
    pub fn interviewer(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Interviewer,
            text: text.into(),
        }
    }

    pub fn candidate(text: impl Into<String>) -> Self {
        Self {
            role: Speaker::Candidate,
            text: text.into(),
        }
    }
}

/// Evaluator output for one completed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 0 – 100
    pub score: u8,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvements: Vec<String>,
}

/// Durable record of one finished interview.
///
/// Transcript is read-only once stored; `analysis` is attached exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: String,
    pub stage_id: String,
    /// Denormalized for display.
    pub stage_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub transcript: Vec<Message>,
    pub analysis: Option<AnalysisResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_serializes_lowercase() {
        let json = serde_json::to_string(&Message::candidate("hi")).unwrap();
        assert_eq!(json, r#"{"role":"candidate","text":"hi"}"#);
    }

    #[test]
    fn test_session_without_analysis_deserializes() {
        let json = serde_json::json!({
            "id": "1700000000000-abc1234",
            "stage_id": "screening",
            "stage_name": "Screening",
            "started_at": "2026-01-05T10:00:00Z",
            "ended_at": "2026-01-05T10:20:00Z",
            "transcript": [
                {"role": "interviewer", "text": "Tell me about yourself."},
                {"role": "candidate", "text": "I build payment systems."}
            ],
            "analysis": null
        });
        let session: InterviewSession = serde_json::from_value(json).unwrap();
        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.transcript[0].role, Speaker::Interviewer);
        assert!(session.analysis.is_none());
    }
}
