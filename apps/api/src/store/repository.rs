use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::errors::AppError;
use crate::models::profile::{NewProfile, ProfileUpdate, UserProfile};
use crate::models::role::{NewRole, Role, RoleUpdate};
use crate::models::session::{AnalysisResult, InterviewSession};
use crate::store::{KeyValueStore, StoreError};

pub const USER_PROFILE_KEY: &str = "userProfile";
pub const ROLES_KEY: &str = "rolesList";
pub const ACTIVE_ROLE_KEY: &str = "activeRoleId";
pub const ACTIVE_SESSION_KEY: &str = "activeSessionId";
pub const ACTIVE_STAGE_KEY: &str = "activeStageId";

const ID_SUFFIX_LEN: usize = 7;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates `<unix-millis>-<7 base36 chars>`.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Pointers used to resume an in-progress selection across page loads.
///
/// The orchestrator never reads these; callers resolve them into an explicit
/// context before an interview starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSelection {
    pub role_id: Option<String>,
    pub stage_id: Option<String>,
    pub session_id: Option<String>,
}

/// Typed access to the persisted records.
///
/// Every mutation is a read-modify-write of a whole JSON document, so writes
/// are serialized through `write_lock`.
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.kv.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.kv.set(key, &raw).await
    }

    async fn write_pointer(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        match value {
            Some(v) => self.kv.set(key, v).await,
            None => self.kv.delete(key).await,
        }
    }

    // ── Profile ────────────────────────────────────────────────────────────

    pub async fn profile(&self) -> Result<Option<UserProfile>, AppError> {
        Ok(self.read_json(USER_PROFILE_KEY).await?)
    }

    /// Creates (or replaces) the singleton profile.
    pub async fn create_profile(&self, new: NewProfile) -> Result<UserProfile, AppError> {
        let _guard = self.write_lock.lock().await;
        let profile = UserProfile::create(new, Utc::now());
        self.write_json(USER_PROFILE_KEY, &profile).await?;
        info!("Saved user profile for {}", profile.name);
        Ok(profile)
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut profile: UserProfile = self
            .read_json(USER_PROFILE_KEY)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile has not been created".to_string()))?;
        profile.apply(update, Utc::now());
        self.write_json(USER_PROFILE_KEY, &profile).await?;
        Ok(profile)
    }

    // ── Roles ──────────────────────────────────────────────────────────────

    /// All roles, newest first.
    pub async fn roles(&self) -> Result<Vec<Role>, AppError> {
        Ok(self.read_json(ROLES_KEY).await?.unwrap_or_default())
    }

    pub async fn role(&self, role_id: &str) -> Result<Role, AppError> {
        self.roles()
            .await?
            .into_iter()
            .find(|r| r.id == role_id)
            .ok_or_else(|| AppError::NotFound(format!("Role {role_id} not found")))
    }

    pub async fn create_role(&self, new: NewRole) -> Result<Role, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut roles: Vec<Role> = self.read_json(ROLES_KEY).await?.unwrap_or_default();

        let mut id = generate_id();
        while roles.iter().any(|r| r.id == id) {
            id = generate_id();
        }

        let role = Role::create(id, new, Utc::now());
        roles.insert(0, role.clone());
        self.write_json(ROLES_KEY, &roles).await?;

        info!(
            "Created role {} ({}) with {} stages",
            role.id,
            role.role_name,
            role.stages.len()
        );
        Ok(role)
    }

    pub async fn update_role(&self, role_id: &str, update: RoleUpdate) -> Result<Role, AppError> {
        self.mutate_role(role_id, |role| {
            role.apply(update);
            Ok(role.clone())
        })
        .await
    }

    /// Deletes a role together with its sessions and clears any active
    /// pointers that referenced it.
    pub async fn delete_role(&self, role_id: &str) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut roles: Vec<Role> = self.read_json(ROLES_KEY).await?.unwrap_or_default();

        let before = roles.len();
        roles.retain(|r| r.id != role_id);
        if roles.len() == before {
            return Err(AppError::NotFound(format!("Role {role_id} not found")));
        }
        self.write_json(ROLES_KEY, &roles).await?;

        if self.kv.get(ACTIVE_ROLE_KEY).await?.as_deref() == Some(role_id) {
            self.write_pointer(ACTIVE_ROLE_KEY, None).await?;
            self.write_pointer(ACTIVE_SESSION_KEY, None).await?;
            self.write_pointer(ACTIVE_STAGE_KEY, None).await?;
        }

        info!("Deleted role {role_id}");
        Ok(())
    }

    async fn mutate_role<T, F>(&self, role_id: &str, mutate: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Role) -> Result<T, AppError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut roles: Vec<Role> = self.read_json(ROLES_KEY).await?.unwrap_or_default();

        let role = roles
            .iter_mut()
            .find(|r| r.id == role_id)
            .ok_or_else(|| AppError::NotFound(format!("Role {role_id} not found")))?;
        let out = mutate(role)?;

        self.write_json(ROLES_KEY, &roles).await?;
        Ok(out)
    }

    // ── Sessions ───────────────────────────────────────────────────────────

    pub async fn add_session(&self, role_id: &str, session: InterviewSession) -> Result<(), AppError> {
        let session_id = session.id.clone();
        self.mutate_role(role_id, |role| {
            if role.session(&session.id).is_some() {
                return Err(AppError::InvalidState(format!(
                    "Session {} already recorded",
                    session.id
                )));
            }
            role.sessions.push(session);
            Ok(())
        })
        .await?;
        info!("Recorded session {session_id} for role {role_id}");
        Ok(())
    }

    /// Attaches the evaluation to a stored session. Allowed exactly once.
    pub async fn attach_analysis(
        &self,
        role_id: &str,
        session_id: &str,
        analysis: AnalysisResult,
    ) -> Result<InterviewSession, AppError> {
        self.mutate_role(role_id, |role| {
            let session = role
                .sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))?;
            if session.analysis.is_some() {
                return Err(AppError::InvalidState(format!(
                    "Session {session_id} has already been analysed"
                )));
            }
            session.analysis = Some(analysis);
            Ok(session.clone())
        })
        .await
    }

    /// Summary of every analysed session of a role, oldest first.
    pub async fn past_feedback_summary(&self, role_id: &str) -> Result<Option<String>, AppError> {
        let role = self.role(role_id).await?;
        Ok(summarize_feedback(&role))
    }

    // ── Active selection ───────────────────────────────────────────────────

    pub async fn selection(&self) -> Result<ActiveSelection, AppError> {
        Ok(ActiveSelection {
            role_id: self.kv.get(ACTIVE_ROLE_KEY).await?,
            stage_id: self.kv.get(ACTIVE_STAGE_KEY).await?,
            session_id: self.kv.get(ACTIVE_SESSION_KEY).await?,
        })
    }

    pub async fn set_selection(&self, selection: &ActiveSelection) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.write_pointer(ACTIVE_ROLE_KEY, selection.role_id.as_deref())
            .await?;
        self.write_pointer(ACTIVE_STAGE_KEY, selection.stage_id.as_deref())
            .await?;
        self.write_pointer(ACTIVE_SESSION_KEY, selection.session_id.as_deref())
            .await?;
        Ok(())
    }
}

/// Renders the analysed sessions of a role as feedback for the next interview.
pub fn summarize_feedback(role: &Role) -> Option<String> {
    let sections: Vec<String> = role
        .sessions
        .iter()
        .filter_map(|s| s.analysis.as_ref().map(|a| (s, a)))
        .enumerate()
        .map(|(index, (session, analysis))| {
            format!(
                "Session {} ({}, Score: {}/100):\n- Strengths: {}\n- Weaknesses: {}\n- Tips: {}",
                index + 1,
                session.stage_name,
                analysis.score,
                analysis.strengths.join(", "),
                analysis.weaknesses.join(", "),
                analysis.improvements.join(", ")
            )
        })
        .collect();

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::InterviewStage;
    use crate::models::session::Message;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()))
    }

    fn new_role(name: &str, stages: Option<Vec<InterviewStage>>) -> NewRole {
        NewRole {
            role_name: name.to_string(),
            company_name: "Acme".to_string(),
            role_title: "Staff Engineer".to_string(),
            jd_text: Some("Own the storage layer.".to_string()),
            jd_file_name: None,
            recruiter_text: None,
            recruiter_file_name: None,
            extra_context: None,
            stages,
        }
    }

    fn session(id: &str, stage: &str) -> InterviewSession {
        let started = Utc::now() - Duration::minutes(20);
        InterviewSession {
            id: id.to_string(),
            stage_id: stage.to_lowercase(),
            stage_name: stage.to_string(),
            started_at: started,
            ended_at: Utc::now(),
            transcript: vec![
                Message::interviewer("Introduce yourself."),
                Message::candidate("I build databases."),
            ],
            analysis: None,
        }
    }

    fn analysis(score: u8) -> AnalysisResult {
        AnalysisResult {
            score,
            summary: "Solid".to_string(),
            strengths: vec!["Depth".to_string(), "Clarity".to_string()],
            weaknesses: vec!["Brevity".to_string()],
            improvements: vec!["Use STAR".to_string()],
        }
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id();
        let (millis, suffix) = id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), ID_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| BASE36.contains(&b)));
    }

    #[tokio::test]
    async fn test_custom_stage_order_survives_reload() {
        let store = store();
        let stages = vec![
            InterviewStage::new("bar-raiser", "Bar Raiser", "Amazon-style bar raiser"),
            InterviewStage::new("screening", "Screening", "Recruiter call"),
            InterviewStage::new("system-design", "System Design", "Whiteboard design"),
            InterviewStage::new("exec", "Executive", "VP conversation"),
        ];
        let created = store
            .create_role(new_role("Acme - Staff", Some(stages.clone())))
            .await
            .unwrap();

        let reloaded = store.role(&created.id).await.unwrap();
        assert_eq!(reloaded.stages, stages);
    }

    #[tokio::test]
    async fn test_new_roles_are_listed_first() {
        let store = store();
        store.create_role(new_role("first", None)).await.unwrap();
        store.create_role(new_role("second", None)).await.unwrap();

        let names: Vec<_> = store
            .roles()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.role_name)
            .collect();
        assert_eq!(names, ["second", "first"]);
    }

    #[tokio::test]
    async fn test_update_profile_without_profile_is_not_found() {
        let err = store()
            .update_profile(ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_profile_update_stamps_updated_at() {
        let store = store();
        let created = store
            .create_profile(NewProfile {
                name: "Grace".to_string(),
                background: String::new(),
                strengths: vec![],
                preferences: String::new(),
                cv_text: None,
                cv_file_name: None,
            })
            .await
            .unwrap();

        let updated = store
            .update_profile(ProfileUpdate {
                preferences: Some("Tough questions please".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.name, "Grace");
        assert_eq!(updated.preferences, "Tough questions please");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_delete_role_cascades_and_clears_selection() {
        let store = store();
        let role = store.create_role(new_role("doomed", None)).await.unwrap();
        store.add_session(&role.id, session("s1", "Screening")).await.unwrap();
        store
            .set_selection(&ActiveSelection {
                role_id: Some(role.id.clone()),
                stage_id: Some("screening".to_string()),
                session_id: Some("s1".to_string()),
            })
            .await
            .unwrap();

        store.delete_role(&role.id).await.unwrap();

        assert!(matches!(
            store.role(&role.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert_eq!(store.selection().await.unwrap(), ActiveSelection::default());
    }

    #[tokio::test]
    async fn test_delete_other_role_keeps_selection() {
        let store = store();
        let kept = store.create_role(new_role("kept", None)).await.unwrap();
        let doomed = store.create_role(new_role("doomed", None)).await.unwrap();
        let selection = ActiveSelection {
            role_id: Some(kept.id.clone()),
            stage_id: None,
            session_id: None,
        };
        store.set_selection(&selection).await.unwrap();

        store.delete_role(&doomed.id).await.unwrap();
        assert_eq!(store.selection().await.unwrap(), selection);
    }

    #[tokio::test]
    async fn test_attach_analysis_only_once() {
        let store = store();
        let role = store.create_role(new_role("r", None)).await.unwrap();
        store.add_session(&role.id, session("s1", "Screening")).await.unwrap();

        let attached = store
            .attach_analysis(&role.id, "s1", analysis(70))
            .await
            .unwrap();
        assert_eq!(attached.analysis.unwrap().score, 70);

        let err = store
            .attach_analysis(&role.id, "s1", analysis(90))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let stored = store.role(&role.id).await.unwrap();
        assert_eq!(stored.sessions[0].analysis.as_ref().unwrap().score, 70);
    }

    #[tokio::test]
    async fn test_duplicate_session_id_rejected() {
        let store = store();
        let role = store.create_role(new_role("r", None)).await.unwrap();
        store.add_session(&role.id, session("s1", "Screening")).await.unwrap();
        let err = store
            .add_session(&role.id, session("s1", "Screening"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_past_feedback_summary_skips_unanalysed_sessions() {
        let store = store();
        let role = store.create_role(new_role("r", None)).await.unwrap();
        assert!(store.past_feedback_summary(&role.id).await.unwrap().is_none());

        store.add_session(&role.id, session("s1", "Screening")).await.unwrap();
        store.add_session(&role.id, session("s2", "Hiring Manager")).await.unwrap();
        store
            .attach_analysis(&role.id, "s2", analysis(64))
            .await
            .unwrap();

        let summary = store.past_feedback_summary(&role.id).await.unwrap().unwrap();
        assert_eq!(
            summary,
            "Session 1 (Hiring Manager, Score: 64/100):\n\
             - Strengths: Depth, Clarity\n\
             - Weaknesses: Brevity\n\
             - Tips: Use STAR"
        );
    }
}
