use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Singleton record describing the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    /// Short professional summary, usually extracted from the résumé.
    pub background: String,
    pub strengths: Vec<String>,
    /// Free-text interview preferences.
    pub preferences: String,
    pub default_cv_text: Option<String>,
    pub default_cv_file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
    pub name: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub preferences: String,
    #[serde(default)]
    pub cv_text: Option<String>,
    #[serde(default)]
    pub cv_file_name: Option<String>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub background: Option<String>,
    pub strengths: Option<Vec<String>>,
    pub preferences: Option<String>,
    pub default_cv_text: Option<String>,
    pub default_cv_file_name: Option<String>,
}

impl UserProfile {
    pub fn create(new: NewProfile, now: DateTime<Utc>) -> Self {
        Self {
            name: new.name,
            background: new.background,
            strengths: new.strengths,
            preferences: new.preferences,
            default_cv_text: new.cv_text,
            default_cv_file_name: new.cv_file_name,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: ProfileUpdate, now: DateTime<Utc>) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(background) = update.background {
            self.background = background;
        }
        if let Some(strengths) = update.strengths {
            self.strengths = strengths;
        }
        if let Some(preferences) = update.preferences {
            self.preferences = preferences;
        }
        if let Some(cv) = update.default_cv_text {
            self.default_cv_text = Some(cv);
        }
        if let Some(file_name) = update.default_cv_file_name {
            self.default_cv_file_name = Some(file_name);
        }
        self.updated_at = now;
    }
}
