//! Turn budget: question-count and elapsed-time limits.
//!
//! Nothing here is stored. The budget is measured from the live history and
//! the wall clock on every turn, so a failed turn can never skew the next one.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::session::{Message, Speaker};

/// First question count at which the interviewer is asked to wrap up.
pub const WRAP_UP_AT: u32 = 9;
/// Question count at which the interviewer must stop.
pub const QUESTION_LIMIT: u32 = 11;
pub const SOFT_TIME_LIMIT_MINUTES: f64 = 25.0;
pub const HARD_TIME_LIMIT_MINUTES: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnBudget {
    /// Interviewer messages so far plus one: the question about to be asked.
    pub question_count: u32,
    pub elapsed_minutes: f64,
}

/// Instruction injected into the interviewer's system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    WrapUp { asked: u32, remaining: u32 },
    ConcludeSoon { minutes: u32 },
    ConcludeNow,
}

impl TurnBudget {
    pub fn measure(history: &[Message], started_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let interviewer_turns = history
            .iter()
            .filter(|m| m.role == Speaker::Interviewer)
            .count() as u32;
        let elapsed_ms = (now - started_at).num_milliseconds().max(0);

        Self {
            question_count: interviewer_turns + 1,
            elapsed_minutes: elapsed_ms as f64 / 60_000.0,
        }
    }

    pub fn questions_exhausted(&self) -> bool {
        self.question_count >= QUESTION_LIMIT
    }

    pub fn time_exhausted(&self) -> bool {
        self.elapsed_minutes >= HARD_TIME_LIMIT_MINUTES
    }

    /// Directives for the next interviewer turn, most severe first.
    ///
    /// A hard stop from either limit yields a single `ConcludeNow` and
    /// suppresses both soft directives.
    pub fn directives(&self) -> Vec<Directive> {
        if self.questions_exhausted() || self.time_exhausted() {
            return vec![Directive::ConcludeNow];
        }

        let mut directives = Vec::new();
        if self.question_count >= WRAP_UP_AT {
            directives.push(Directive::WrapUp {
                asked: self.question_count - 1,
                remaining: QUESTION_LIMIT - self.question_count,
            });
        }
        if self.elapsed_minutes >= SOFT_TIME_LIMIT_MINUTES {
            directives.push(Directive::ConcludeSoon {
                minutes: self.elapsed_minutes.floor() as u32,
            });
        }
        directives
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::WrapUp { asked, remaining } => write!(
                f,
                "You have asked {asked} questions. You have {remaining} question{} remaining. \
                 Start wrapping up naturally.",
                if *remaining == 1 { "" } else { "s" }
            ),
            Directive::ConcludeSoon { minutes } => write!(
                f,
                "You have been interviewing for {minutes} minutes. \
                 You must conclude the interview in the next few minutes."
            ),
            Directive::ConcludeNow => f.write_str(
                "You MUST conclude the interview immediately. \
                 Thank the candidate and end the session.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn history(interviewer_turns: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        for i in 0..interviewer_turns {
            messages.push(Message::interviewer(format!("Question {i}")));
            messages.push(Message::candidate(format!("Answer {i}")));
        }
        messages
    }

    fn budget(interviewer_turns: usize, minutes: i64) -> TurnBudget {
        let start = Utc::now();
        TurnBudget::measure(
            &history(interviewer_turns),
            start,
            start + Duration::minutes(minutes),
        )
    }

    #[test]
    fn test_question_count_includes_next_question() {
        assert_eq!(budget(0, 0).question_count, 1);
        assert_eq!(budget(4, 0).question_count, 5);
    }

    #[test]
    fn test_no_directives_early() {
        assert!(budget(7, 24).directives().is_empty());
    }

    #[test]
    fn test_wrap_up_reports_remaining_questions() {
        let directives = budget(9, 5).directives();
        assert_eq!(
            directives,
            vec![Directive::WrapUp {
                asked: 9,
                remaining: 1
            }]
        );

        let directives = budget(8, 5).directives();
        assert_eq!(
            directives,
            vec![Directive::WrapUp {
                asked: 8,
                remaining: 2
            }]
        );
        assert!(directives[0].to_string().contains("You have 2 questions remaining"));
    }

    #[test]
    fn test_single_remaining_question_is_singular() {
        let text = budget(9, 0).directives()[0].to_string();
        assert!(text.contains("You have 1 question remaining"));
    }

    #[test]
    fn test_question_limit_forces_conclusion() {
        assert_eq!(budget(10, 3).directives(), vec![Directive::ConcludeNow]);
    }

    #[test]
    fn test_soft_time_directive_uses_whole_minutes() {
        let start = Utc::now();
        let b = TurnBudget::measure(&history(2), start, start + Duration::seconds(27 * 60 + 40));
        assert_eq!(b.directives(), vec![Directive::ConcludeSoon { minutes: 27 }]);
        assert!(b.directives()[0]
            .to_string()
            .starts_with("You have been interviewing for 27 minutes."));
    }

    #[test]
    fn test_elapsed_31_minutes_forces_conclusion_at_any_count() {
        assert_eq!(budget(1, 31).directives(), vec![Directive::ConcludeNow]);
    }

    #[test]
    fn test_both_hard_stops_emit_one_directive() {
        let directives = budget(12, 45).directives();
        assert_eq!(directives, vec![Directive::ConcludeNow]);
    }

    #[test]
    fn test_wrap_up_and_soft_time_combine() {
        let directives = budget(8, 26).directives();
        assert_eq!(
            directives,
            vec![
                Directive::WrapUp {
                    asked: 8,
                    remaining: 2
                },
                Directive::ConcludeSoon { minutes: 26 },
            ]
        );
    }

    #[test]
    fn test_clock_skew_counts_as_zero_elapsed() {
        let start = Utc::now();
        let b = TurnBudget::measure(&[], start, start - Duration::minutes(5));
        assert_eq!(b.elapsed_minutes, 0.0);
    }
}
