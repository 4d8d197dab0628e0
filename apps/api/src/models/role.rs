use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::session::InterviewSession;

/// A named interview phase with its own tone and focus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewStage {
    pub id: String,
    pub name: String,
    /// Brief description handed to the interviewer as context.
    pub description: String,
}

impl InterviewStage {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Stages given to a role when the user does not define their own.
pub fn default_stages() -> Vec<InterviewStage> {
    vec![
        InterviewStage::new(
            "screening",
            "Screening",
            "Recruiter call focusing on logistics, salary expectations, and high-level fit assessment.",
        ),
        InterviewStage::new(
            "hiring-manager",
            "Hiring Manager",
            "Deep dive into experience, technical skills, project impact, and problem-solving abilities.",
        ),
        InterviewStage::new(
            "cultural-fit",
            "Cultural Fit",
            "Values alignment, collaboration style, team dynamics, and interpersonal skills assessment.",
        ),
    ]
}

/// A tracked job opportunity with its own stages and session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    /// Display name, e.g. "DevRev - Senior Designer".
    pub role_name: String,
    pub company_name: String,
    pub role_title: String,
    pub jd_text: Option<String>,
    pub jd_file_name: Option<String>,
    pub recruiter_text: Option<String>,
    pub recruiter_file_name: Option<String>,
    pub extra_context: Option<String>,
    /// Overrides the profile's default résumé for this role.
    pub custom_cv_text: Option<String>,
    pub custom_cv_file_name: Option<String>,
    pub stages: Vec<InterviewStage>,
    pub created_at: DateTime<Utc>,
    pub sessions: Vec<InterviewSession>,
}

impl Role {
    pub fn stage(&self, stage_id: &str) -> Option<&InterviewStage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    pub fn session(&self, session_id: &str) -> Option<&InterviewSession> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// The stage that follows `stage_id`, or `None` at the end of the list
    /// or when the stage is unknown.
    pub fn next_stage(&self, stage_id: &str) -> Option<&InterviewStage> {
        let index = self.stages.iter().position(|s| s.id == stage_id)?;
        self.stages.get(index + 1)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub role_name: String,
    #[serde(default)]
    pub company_name: String,
    pub role_title: String,
    #[serde(default)]
    pub jd_text: Option<String>,
    #[serde(default)]
    pub jd_file_name: Option<String>,
    #[serde(default)]
    pub recruiter_text: Option<String>,
    #[serde(default)]
    pub recruiter_file_name: Option<String>,
    #[serde(default)]
    pub extra_context: Option<String>,
    #[serde(default)]
    pub stages: Option<Vec<InterviewStage>>,
}

/// Partial metadata update. Sessions are never edited through this path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    pub role_name: Option<String>,
    pub company_name: Option<String>,
    pub role_title: Option<String>,
    pub jd_text: Option<String>,
    pub jd_file_name: Option<String>,
    pub recruiter_text: Option<String>,
    pub recruiter_file_name: Option<String>,
    pub extra_context: Option<String>,
    pub custom_cv_text: Option<String>,
    pub custom_cv_file_name: Option<String>,
    pub stages: Option<Vec<InterviewStage>>,
}

impl Role {
    pub fn create(id: String, new: NewRole, now: DateTime<Utc>) -> Self {
        let stages = match new.stages {
            Some(stages) if !stages.is_empty() => stages,
            _ => default_stages(),
        };
        Self {
            id,
            role_name: new.role_name,
            company_name: new.company_name,
            role_title: new.role_title,
            jd_text: new.jd_text,
            jd_file_name: new.jd_file_name,
            recruiter_text: new.recruiter_text,
            recruiter_file_name: new.recruiter_file_name,
            extra_context: new.extra_context,
            custom_cv_text: None,
            custom_cv_file_name: None,
            stages,
            created_at: now,
            sessions: Vec::new(),
        }
    }

    pub fn apply(&mut self, update: RoleUpdate) {
        let RoleUpdate {
            role_name,
            company_name,
            role_title,
            jd_text,
            jd_file_name,
            recruiter_text,
            recruiter_file_name,
            extra_context,
            custom_cv_text,
            custom_cv_file_name,
            stages,
        } = update;

        if let Some(v) = role_name {
            self.role_name = v;
        }
        if let Some(v) = company_name {
            self.company_name = v;
        }
        if let Some(v) = role_title {
            self.role_title = v;
        }
        if jd_text.is_some() {
            self.jd_text = jd_text;
        }
        if jd_file_name.is_some() {
            self.jd_file_name = jd_file_name;
        }
        if recruiter_text.is_some() {
            self.recruiter_text = recruiter_text;
        }
        if recruiter_file_name.is_some() {
            self.recruiter_file_name = recruiter_file_name;
        }
        if extra_context.is_some() {
            self.extra_context = extra_context;
        }
        if custom_cv_text.is_some() {
            self.custom_cv_text = custom_cv_text;
        }
        if custom_cv_file_name.is_some() {
            self.custom_cv_file_name = custom_cv_file_name;
        }
        if let Some(stages) = stages.filter(|s| !s.is_empty()) {
            self.stages = stages;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_role(stages: Option<Vec<InterviewStage>>) -> NewRole {
        NewRole {
            role_name: "Wise - Senior Designer".to_string(),
            company_name: "Wise".to_string(),
            role_title: "Senior Designer".to_string(),
            jd_text: None,
            jd_file_name: None,
            recruiter_text: None,
            recruiter_file_name: None,
            extra_context: None,
            stages,
        }
    }

    #[test]
    fn test_role_without_stages_gets_defaults() {
        let role = Role::create("r1".to_string(), new_role(None), Utc::now());
        let ids: Vec<_> = role.stages.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["screening", "hiring-manager", "cultural-fit"]);
    }

    #[test]
    fn test_empty_stage_list_falls_back_to_defaults() {
        let role = Role::create("r1".to_string(), new_role(Some(vec![])), Utc::now());
        assert_eq!(role.stages.len(), 3);
    }

    #[test]
    fn test_next_stage() {
        let role = Role::create("r1".to_string(), new_role(None), Utc::now());
        assert_eq!(role.next_stage("screening").unwrap().id, "hiring-manager");
        assert!(role.next_stage("cultural-fit").is_none());
        assert!(role.next_stage("unknown").is_none());
    }

    #[test]
    fn test_apply_keeps_unset_fields() {
        let mut role = Role::create("r1".to_string(), new_role(None), Utc::now());
        role.apply(RoleUpdate {
            extra_context: Some("Rejected last time for weak system design".to_string()),
            ..Default::default()
        });
        assert_eq!(role.role_title, "Senior Designer");
        assert_eq!(
            role.extra_context.as_deref(),
            Some("Rejected last time for weak system design")
        );
        assert_eq!(role.stages.len(), 3);
    }
}
