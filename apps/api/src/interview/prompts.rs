// Interviewer and evaluator prompts.
// The same instruction builder serves discrete turns and realtime sessions.

use crate::interview::budget::Directive;
use crate::models::context::InterviewContext;
use crate::models::session::{Message, Speaker};

/// User-role request sent with the opening turn.
pub const OPENING_REQUEST: &str =
    "Please start the interview by introducing yourself and asking for my intro pitch.";

const OPENING_DIRECTIVE: &str = "When starting a new interview, introduce yourself briefly \
    and ask the candidate to provide their short intro pitch (elevator pitch).";

const PERSONA: &str = r#"You are a professional, high-stakes interviewer. Your goal is to conduct a realistic, rigorous mock interview.

## Communication Style:
1. **Natural Conversationalist**: Write naturally and conversationally. Avoid monotonous or robotic responses. Use varied sentence structures.
2. **Human-like Flow**: Use natural transitions like "I see" or "Thank you for that detail" sparingly to keep a professional yet human flow.
3. **Concise Responses**: Keep your responses focused and sized for a spoken exchange. Don't write essays.

## Core Content:
The candidate has provided their CV, a Job Description, and optionally recruiter profile details and extra context.

## Strict Behavioral Guidelines:
1. **Objectivity & Neutrality**: Avoid positive bias. Do not over-praise the candidate. Your role is to assess fit, not to cheer.
2. **Follow-up Questions**: Listen actively. Ask probing follow-up questions based on the candidate's specific answers to dig into their experience and claims.
3. **No Session Feedback**: Do not give feedback, critique, or "good job" comments during the interview. Keep reactions professional and non-committal.
4. **One Question at a Time**: Ask only ONE question per response. Wait for the candidate to answer before asking the next question.
5. **Tone & Persona**: Adapt your tone to the recruiter profile AND the current interview stage.
6. **Challenge & Adapt**: Ask challenging questions based on the Job Description and gaps in the candidate's background. If the extra context or past feedback mentions weak points, test the candidate on them."#;

const SCREENING_GUIDANCE: &str = "You are an efficient recruiter. Focus on high-level fit, \
    core requirements, and logistics. Be friendly but move quickly.";
const HIRING_MANAGER_GUIDANCE: &str = "You are a deeply technical leader or department head. \
    Dive deep into projects, architecture, and how things were built. \
    Be rigorous and probe for depth of knowledge.";
const CULTURAL_FIT_GUIDANCE: &str = "You are a potential peer or team lead. Focus on values, \
    collaboration, and how the candidate handles interpersonal situations. Be warm and observant.";

/// Whether the instruction is for the first interviewer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    Opening,
    FollowUp,
}

fn stage_guidance(stage_key: &str) -> Option<&'static str> {
    match stage_key {
        "screening" => Some(SCREENING_GUIDANCE),
        "hiring-manager" | "hiring manager" => Some(HIRING_MANAGER_GUIDANCE),
        "cultural-fit" | "cultural fit" | "culture fit" => Some(CULTURAL_FIT_GUIDANCE),
        _ => None,
    }
}

fn candidate_line(ctx: &InterviewContext) -> String {
    let Some(name) = ctx.candidate_name() else {
        return "Not provided".to_string();
    };
    let mut line = name.to_string();
    if let Some(background) = ctx.candidate_background() {
        line.push_str(&format!(". {background}"));
    }
    if !ctx.candidate_strengths.is_empty() {
        line.push_str(&format!(" Strengths: {}.", ctx.candidate_strengths.join(", ")));
    }
    if let Some(preferences) = ctx.candidate_preferences() {
        line.push_str(&format!(" Preferences: {preferences}"));
    }
    line
}

fn role_line(ctx: &InterviewContext) -> String {
    let title = ctx.role_title().unwrap_or("Not provided");
    let mut line = match ctx.company_name() {
        Some(company) => format!("{title} at {company}"),
        None => title.to_string(),
    };
    if let Some(jd) = ctx.jd_text() {
        line.push_str(&format!("\n{jd}"));
    }
    line
}

/// Builds the system instruction for one interviewer turn.
pub fn build_instructions(
    ctx: &InterviewContext,
    directives: &[Directive],
    kind: TurnKind,
) -> String {
    let stage_name = ctx.stage_name().unwrap_or("screening");
    let stage_key = ctx
        .stage_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(stage_name)
        .to_lowercase();

    let guidance = stage_guidance(&stage_key)
        .or_else(|| stage_guidance(&stage_name.to_lowercase()))
        .unwrap_or("Conduct this stage as a seasoned interviewer would.");

    let mut out = String::with_capacity(4096);
    out.push_str(PERSONA);

    out.push_str(&format!("\n\n## Interview Stage:\n- **{stage_name}**: {guidance}\n"));
    if let Some(description) = ctx.stage_description() {
        out.push_str(&format!("- Stage focus: {description}\n"));
    }

    out.push_str(&format!(
        "\n## Context Details:\n\
         [Interview Stage]: {stage_name}\n\
         [Candidate]: {candidate}\n\
         [CV]: {cv}\n\
         [Job Description / Role]: {role}\n\
         [Recruiter Context]: {recruiter}\n\
         [Extra Context / Feedback]: {extra}\n\
         [Past Session Feedback]: {past}\n\
         [Interview Focus]: {focus}\n",
        candidate = candidate_line(ctx),
        cv = ctx.cv_text().unwrap_or("Not provided"),
        role = role_line(ctx),
        recruiter = ctx.recruiter_text().unwrap_or("Professional recruiter"),
        extra = ctx.extra_context().unwrap_or("None provided"),
        past = ctx.past_feedback().unwrap_or("None"),
        focus = ctx.stage_description().unwrap_or("General interview"),
    ));

    if !directives.is_empty() {
        out.push_str("\n## ACTIVE CONSTRAINTS:\n");
        for directive in directives {
            let label = match directive {
                Directive::ConcludeNow => "URGENT",
                _ => "CONSTRAINT",
            };
            out.push_str(&format!("- **{label}**: {directive}\n"));
        }
    }

    if kind == TurnKind::Opening {
        out.push('\n');
        out.push_str(OPENING_DIRECTIVE);
    }

    out
}

pub const EVALUATION_SYSTEM: &str = r#"You are an expert interview coach. Analyze the following interview transcript based on the provided job context.

Return a JSON object with this EXACT schema:
{
  "score": number (0-100),
  "summary": "string",
  "strengths": ["string", "string"],
  "weaknesses": ["string", "string"],
  "improvements": ["string", "string"]
}"#;

/// User prompt for the evaluator: the job context followed by the transcript.
pub fn evaluation_prompt(ctx: &InterviewContext, transcript: &[Message]) -> String {
    let context = serde_json::to_string(ctx).unwrap_or_default();
    let lines: Vec<String> = transcript
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Speaker::Interviewer => "interviewer",
                Speaker::Candidate => "candidate",
            };
            format!("{speaker}: {}", m.text)
        })
        .collect();

    format!(
        "Context: {context}\n\nTranscript:\n{}",
        lines.join("\n")
    )
}
