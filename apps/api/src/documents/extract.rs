//! Model-assisted field extraction from résumé and job-description text.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::llm_client::prompts::{truncate_document, JSON_ONLY_INSTRUCTION};
use crate::llm_client::LlmClient;

const UNKNOWN_NAME: &str = "Unknown";

pub const PROFILE_EXTRACTION_SYSTEM: &str = r#"You are an expert CV analyzer. Extract key information from the provided CV/Resume to create a candidate profile.

Return a JSON object with the following structure:
{
  "name": "Full name of the candidate",
  "background": "A concise 2-3 sentence professional summary describing their experience, seniority level, and primary domain expertise. Write in third person.",
  "strengths": ["5-7 key skills, achievements, or areas of expertise extracted from the CV"]
}

Focus on professional experience and seniority, key achievements and impact, technical skills and domain expertise, and leadership.
Strengths should be specific, not generic."#;

pub const ROLE_EXTRACTION_SYSTEM: &str = r#"You are an expert at analyzing job descriptions. Extract key information to create a role summary.

Return a JSON object with the following structure:
{
  "role_name": "A short name combining company and role, e.g. 'Wise - Senior Designer'",
  "company_name": "The company name only",
  "role_title": "The exact job title, e.g. 'Senior Product Designer'"
}

If any field cannot be determined, use an empty string."#;

/// Profile fields suggested from a résumé.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDraft {
    pub name: String,
    pub background: String,
    pub strengths: Vec<String>,
}

/// Role fields suggested from a job description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleDraft {
    pub role_name: String,
    pub company_name: String,
    pub role_title: String,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    background: Option<String>,
    #[serde(default)]
    strengths: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawRole {
    #[serde(default, alias = "roleName")]
    role_name: Option<String>,
    #[serde(default, alias = "companyName")]
    company_name: Option<String>,
    #[serde(default, alias = "roleTitle")]
    role_title: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_text(text: &str) -> Result<&str, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Document text is required".to_string()));
    }
    Ok(truncate_document(text))
}

pub async fn extract_profile(llm: &LlmClient, cv_text: &str) -> Result<ProfileDraft, AppError> {
    let text = require_text(cv_text)?;
    let system = format!("{PROFILE_EXTRACTION_SYSTEM}\n\n{JSON_ONLY_INSTRUCTION}");
    let raw: RawProfile = llm
        .call_json(&system, &format!("CV Content:\n{text}"))
        .await?;

    let draft = ProfileDraft {
        name: non_blank(raw.name).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        background: non_blank(raw.background).unwrap_or_default(),
        strengths: raw
            .strengths
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect(),
    };
    info!(
        "Extracted profile draft with {} strengths",
        draft.strengths.len()
    );
    Ok(draft)
}

pub async fn extract_role(llm: &LlmClient, jd_text: &str) -> Result<RoleDraft, AppError> {
    let text = require_text(jd_text)?;
    let system = format!("{ROLE_EXTRACTION_SYSTEM}\n\n{JSON_ONLY_INSTRUCTION}");
    let raw: RawRole = llm
        .call_json(&system, &format!("Job Description:\n{text}"))
        .await?;

    Ok(RoleDraft {
        role_name: non_blank(raw.role_name).unwrap_or_default(),
        company_name: non_blank(raw.company_name).unwrap_or_default(),
        role_title: non_blank(raw.role_title).unwrap_or_default(),
    })
}
