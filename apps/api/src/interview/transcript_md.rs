use std::fmt::Write;

use crate::models::role::Role;
use crate::models::session::{InterviewSession, Speaker};

/// Renders a stored session as a markdown report.
pub fn render_session_markdown(
    role: &Role,
    session: &InterviewSession,
    candidate_name: Option<&str>,
) -> String {
    let mut md = String::new();

    md.push_str("# Interview Session Report\n\n");
    let _ = writeln!(md, "**Date:** {}", session.started_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(md, "**Role:** {}", role.role_name);
    let _ = writeln!(md, "**Interview Type:** {}", session.stage_name);
    let _ = writeln!(md, "**Candidate:** {}", candidate_name.unwrap_or("Unknown"));
    let minutes = (session.ended_at - session.started_at).num_minutes();
    let _ = writeln!(md, "**Duration:** {minutes} min");

    md.push_str("\n---\n\n## Transcript\n\n");
    if session.transcript.is_empty() {
        md.push_str("*No transcript recorded*\n");
    } else {
        for message in &session.transcript {
            let speaker = match message.role {
                Speaker::Interviewer => "AI Interviewer",
                Speaker::Candidate => "Candidate",
            };
            let _ = writeln!(md, "**{speaker}:** {}\n", message.text);
        }
    }

    md.push_str("\n---\n\n## Evaluation\n\n");
    let Some(analysis) = &session.analysis else {
        md.push_str("*Evaluation not available*\n");
        return md;
    };

    let _ = writeln!(md, "### Overall Score: {}/100\n", analysis.score);
    let _ = writeln!(md, "### Summary\n\n{}\n", analysis.summary);

    md.push_str("### Key Strengths\n\n");
    for item in &analysis.strengths {
        let _ = writeln!(md, "- {item}");
    }

    md.push_str("\n### Areas for Improvement\n\n");
    for item in &analysis.weaknesses {
        let _ = writeln!(md, "- {item}");
    }

    md.push_str("\n### Action Plan\n\n");
    for (i, item) in analysis.improvements.iter().enumerate() {
        let _ = writeln!(md, "{}. {item}", i + 1);
    }

    md
}

/// Object key used when archiving a report.
pub fn archive_key(role_id: &str, session_id: &str) -> String {
    format!("transcripts/{role_id}/{session_id}.md")
}
