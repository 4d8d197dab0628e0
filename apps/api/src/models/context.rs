use serde::{Deserialize, Serialize};

use crate::models::profile::UserProfile;
use crate::models::role::{InterviewStage, Role};

/// Immutable per-session configuration, assembled once before the first turn.
///
/// Every field is optional on the wire; the instruction builder substitutes
/// documented defaults for anything missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterviewContext {
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub candidate_background: Option<String>,
    #[serde(default)]
    pub candidate_strengths: Vec<String>,
    #[serde(default)]
    pub candidate_preferences: Option<String>,
    #[serde(default)]
    pub cv_text: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub role_title: Option<String>,
    #[serde(default)]
    pub jd_text: Option<String>,
    #[serde(default)]
    pub recruiter_text: Option<String>,
    #[serde(default)]
    pub extra_context: Option<String>,
    #[serde(default)]
    pub stage_id: Option<String>,
    #[serde(default)]
    pub stage_name: Option<String>,
    #[serde(default)]
    pub stage_description: Option<String>,
    #[serde(default)]
    pub past_feedback: Option<String>,
}

/// Treats empty and whitespace-only strings as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl InterviewContext {
    /// Builds the context from explicit values. Nothing is looked up ambiently.
    /// The role's override résumé wins over the profile default.
    pub fn assemble(
        profile: Option<&UserProfile>,
        role: &Role,
        stage: &InterviewStage,
        past_feedback: Option<String>,
    ) -> Self {
        let cv_text = role
            .custom_cv_text
            .clone()
            .or_else(|| profile.and_then(|p| p.default_cv_text.clone()));

        Self {
            candidate_name: profile.map(|p| p.name.clone()),
            candidate_background: profile.map(|p| p.background.clone()),
            candidate_strengths: profile.map(|p| p.strengths.clone()).unwrap_or_default(),
            candidate_preferences: profile
                .map(|p| p.preferences.clone())
                .filter(|p| !p.trim().is_empty()),
            cv_text,
            role_name: Some(role.role_name.clone()),
            company_name: Some(role.company_name.clone()).filter(|c| !c.trim().is_empty()),
            role_title: Some(role.role_title.clone()),
            jd_text: role.jd_text.clone(),
            recruiter_text: role.recruiter_text.clone(),
            extra_context: role.extra_context.clone(),
            stage_id: Some(stage.id.clone()),
            stage_name: Some(stage.name.clone()),
            stage_description: Some(stage.description.clone()),
            past_feedback,
        }
    }

    pub fn role_title(&self) -> Option<&str> {
        present(&self.role_title)
    }

    pub fn stage_name(&self) -> Option<&str> {
        present(&self.stage_name)
    }

    pub fn candidate_name(&self) -> Option<&str> {
        present(&self.candidate_name)
    }

    pub fn cv_text(&self) -> Option<&str> {
        present(&self.cv_text)
    }

    pub fn jd_text(&self) -> Option<&str> {
        present(&self.jd_text)
    }

    pub fn recruiter_text(&self) -> Option<&str> {
        present(&self.recruiter_text)
    }

    pub fn extra_context(&self) -> Option<&str> {
        present(&self.extra_context)
    }

    pub fn stage_description(&self) -> Option<&str> {
        present(&self.stage_description)
    }

    pub fn past_feedback(&self) -> Option<&str> {
        present(&self.past_feedback)
    }

    pub fn candidate_background(&self) -> Option<&str> {
        present(&self.candidate_background)
    }

    pub fn candidate_preferences(&self) -> Option<&str> {
        present(&self.candidate_preferences)
    }

    pub fn company_name(&self) -> Option<&str> {
        present(&self.company_name)
    }
}
