//! Conversational Turn Engine: drives one interview from the opening question
//! to the end, one exchange at a time.
//!
//! State machine: `Uninitialized → Active → Ended`.
//! - `start_interview` is the only way into `Active`; on failure the engine
//!   stays `Uninitialized` with an empty history so the caller can retry.
//! - `send_turn` keeps the engine `Active` whether or not the reply arrives.
//! - `end_interview` freezes the transcript; nothing leaves `Ended`.
//!
//! Callers must not overlap `send_turn` calls. The HTTP layer holds one async
//! mutex per live session, which enforces this.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::interview::budget::TurnBudget;
use crate::interview::prompts::{build_instructions, TurnKind, OPENING_REQUEST};
use crate::llm_client::{ChatMessage, ChatRole, LlmClient, LlmError};
use crate::models::context::InterviewContext;
use crate::models::session::{Message, Speaker};

/// Produces the next interviewer message from a system instruction and the
/// replayed history.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn reply(&self, system: &str, history: &[ChatMessage]) -> Result<String, LlmError>;
}

#[async_trait]
impl ReasoningService for LlmClient {
    async fn reply(&self, system: &str, history: &[ChatMessage]) -> Result<String, LlmError> {
        self.chat(system, history).await
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Active,
    Ended,
}

// ────────────────────────────────────────────────────────────────────────────
// Transcript with two-phase candidate append
// ────────────────────────────────────────────────────────────────────────────

/// Append-only message history.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

/// A candidate message that is already in the history and awaits the
/// interviewer's reply.
///
/// The candidate text is never rolled back: `confirm` adds the reply and
/// `fail` (or dropping the value) leaves the candidate message unanswered.
#[must_use = "a pending turn must be confirmed or failed"]
pub struct PendingTurn<'a> {
    transcript: &'a mut Transcript,
}

impl Transcript {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push_interviewer(&mut self, text: String) -> &Message {
        self.messages.push(Message::interviewer(text));
        &self.messages[self.messages.len() - 1]
    }

    fn begin_turn(&mut self, candidate_text: String) -> PendingTurn<'_> {
        self.messages.push(Message::candidate(candidate_text));
        PendingTurn { transcript: self }
    }

    /// History in the shape the reasoning service expects.
    fn chat_history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(to_chat_message).collect()
    }
}

impl PendingTurn<'_> {
    /// Full history including the provisional candidate message.
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.transcript.chat_history()
    }

    pub fn confirm(self, reply: String) -> Message {
        self.transcript.push_interviewer(reply).clone()
    }

    pub fn fail(self) {
        debug!(
            "Turn failed; candidate message kept at position {}",
            self.transcript.len() - 1
        );
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        Speaker::Interviewer => ChatRole::Assistant,
        Speaker::Candidate => ChatRole::User,
    };
    ChatMessage::new(role, message.text.clone())
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

enum Phase {
    Uninitialized,
    Active {
        started_at: DateTime<Utc>,
    },
    Ended {
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    },
}

/// The frozen result of a finished interview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedInterview {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub transcript: Vec<Message>,
}

pub struct InterviewEngine {
    reasoning: Arc<dyn ReasoningService>,
    clock: Arc<dyn Clock>,
    context: InterviewContext,
    transcript: Transcript,
    phase: Phase,
}

impl InterviewEngine {
    pub fn new(reasoning: Arc<dyn ReasoningService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            reasoning,
            clock,
            context: InterviewContext::default(),
            transcript: Transcript::default(),
            phase: Phase::Uninitialized,
        }
    }

    pub fn state(&self) -> EngineState {
        match self.phase {
            Phase::Uninitialized => EngineState::Uninitialized,
            Phase::Active { .. } => EngineState::Active,
            Phase::Ended { .. } => EngineState::Ended,
        }
    }

    pub fn context(&self) -> &InterviewContext {
        &self.context
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            Phase::Uninitialized => None,
            Phase::Active { started_at } | Phase::Ended { started_at, .. } => Some(started_at),
        }
    }

    /// Budget for the next interviewer turn, while the interview is live.
    pub fn budget(&self) -> Option<TurnBudget> {
        match self.phase {
            Phase::Active { started_at } => Some(TurnBudget::measure(
                self.transcript.messages(),
                started_at,
                self.clock.now(),
            )),
            _ => None,
        }
    }

    /// Fixes the start time, asks for the opening question and returns it.
    pub async fn start_interview(&mut self, context: InterviewContext) -> Result<Message, AppError> {
        if !matches!(self.phase, Phase::Uninitialized) {
            return Err(AppError::InvalidState(
                "Interview has already been started".to_string(),
            ));
        }
        if context.role_title().is_none() {
            return Err(AppError::Validation("Role title is required".to_string()));
        }

        let started_at = self.clock.now();
        let budget = TurnBudget::measure(&[], started_at, started_at);
        let system = build_instructions(&context, &budget.directives(), TurnKind::Opening);
        let opening = [ChatMessage::new(ChatRole::User, OPENING_REQUEST)];

        let reply = self.reasoning.reply(&system, &opening).await.map_err(|e| {
            warn!("Opening turn failed: {e}");
            AppError::from(e)
        })?;

        self.context = context;
        self.transcript = Transcript::default();
        let message = self.transcript.push_interviewer(reply).clone();
        self.phase = Phase::Active { started_at };

        info!(
            "Interview started: role={:?}, stage={:?}",
            self.context.role_title(),
            self.context.stage_name()
        );
        Ok(message)
    }

    /// Appends the candidate's answer, then asks for the next interviewer
    /// message. On failure the answer stays in the history.
    pub async fn send_turn(&mut self, candidate_text: &str) -> Result<Message, AppError> {
        let started_at = match self.phase {
            Phase::Active { started_at } => started_at,
            Phase::Uninitialized => {
                return Err(AppError::InvalidState(
                    "Interview has not been started".to_string(),
                ))
            }
            Phase::Ended { .. } => {
                return Err(AppError::InvalidState("Interview has ended".to_string()))
            }
        };

        let text = candidate_text.trim();
        if text.is_empty() {
            return Err(AppError::Validation(
                "Candidate message must not be empty".to_string(),
            ));
        }

        let budget = TurnBudget::measure(self.transcript.messages(), started_at, self.clock.now());
        let directives = budget.directives();
        debug!(
            "Turn budget: question_count={}, elapsed_minutes={:.1}, directives={}",
            budget.question_count,
            budget.elapsed_minutes,
            directives.len()
        );
        let system = build_instructions(&self.context, &directives, TurnKind::FollowUp);

        let pending = self.transcript.begin_turn(text.to_string());
        let history = pending.chat_history();

        match self.reasoning.reply(&system, &history).await {
            Ok(reply) => Ok(pending.confirm(reply)),
            Err(e) => {
                pending.fail();
                warn!("Interviewer reply failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Freezes the transcript. Calling again returns the same result.
    pub fn end_interview(&mut self) -> Result<FinishedInterview, AppError> {
        let (started_at, ended_at) = match self.phase {
            Phase::Uninitialized => {
                return Err(AppError::InvalidState(
                    "Interview has not been started".to_string(),
                ))
            }
            Phase::Active { started_at } => {
                let ended_at = self.clock.now();
                self.phase = Phase::Ended {
                    started_at,
                    ended_at,
                };
                info!(
                    "Interview ended after {} messages",
                    self.transcript.len()
                );
                (started_at, ended_at)
            }
            Phase::Ended {
                started_at,
                ended_at,
            } => (started_at, ended_at),
        };

        Ok(FinishedInterview {
            started_at,
            ended_at,
            transcript: self.transcript.messages().to_vec(),
        })
    }

    #[cfg(test)]
    fn replayed_history(&self) -> Vec<ChatMessage> {
        self.transcript.chat_history()
    }
}
