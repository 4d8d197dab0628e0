use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::interview::transcript_md::{archive_key, render_session_markdown};
use crate::models::context::InterviewContext;
use crate::models::profile::{NewProfile, ProfileUpdate, UserProfile};
use crate::models::role::{InterviewStage, NewRole, Role, RoleUpdate};
use crate::models::session::InterviewSession;
use crate::state::AppState;
use crate::store::repository::summarize_feedback;
use crate::store::ActiveSelection;

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub role_id: String,
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextStageResponse {
    pub next_stage: Option<InterviewStage>,
}

fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

// ── Profile ────────────────────────────────────────────────────────────────

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let profile = state
        .store
        .profile()
        .await?
        .ok_or_else(|| AppError::NotFound("User profile has not been created".to_string()))?;
    Ok(Json(profile))
}

/// POST /api/v1/profile
pub async fn handle_create_profile(
    State(state): State<AppState>,
    Json(req): Json<NewProfile>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    require(&req.name, "name")?;
    let profile = state.store.create_profile(req).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// PATCH /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, AppError> {
    if let Some(name) = &req.name {
        require(name, "name")?;
    }
    Ok(Json(state.store.update_profile(req).await?))
}

// ── Roles ──────────────────────────────────────────────────────────────────

/// GET /api/v1/roles
pub async fn handle_list_roles(State(state): State<AppState>) -> Result<Json<Vec<Role>>, AppError> {
    Ok(Json(state.store.roles().await?))
}

/// POST /api/v1/roles
pub async fn handle_create_role(
    State(state): State<AppState>,
    Json(req): Json<NewRole>,
) -> Result<(StatusCode, Json<Role>), AppError> {
    require(&req.role_name, "role_name")?;
    require(&req.role_title, "role_title")?;
    let role = state.store.create_role(req).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// GET /api/v1/roles/:role_id
pub async fn handle_get_role(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
) -> Result<Json<Role>, AppError> {
    Ok(Json(state.store.role(&role_id).await?))
}

/// PATCH /api/v1/roles/:role_id
pub async fn handle_update_role(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
    Json(req): Json<RoleUpdate>,
) -> Result<Json<Role>, AppError> {
    if let Some(title) = &req.role_title {
        require(title, "role_title")?;
    }
    if matches!(&req.stages, Some(stages) if stages.is_empty()) {
        return Err(AppError::Validation(
            "A role needs at least one stage".to_string(),
        ));
    }
    Ok(Json(state.store.update_role(&role_id, req).await?))
}

/// DELETE /api/v1/roles/:role_id
pub async fn handle_delete_role(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_role(&role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/roles/:role_id/feedback
pub async fn handle_get_feedback(
    State(state): State<AppState>,
    Path(role_id): Path<String>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let feedback = state.store.past_feedback_summary(&role_id).await?;
    Ok(Json(FeedbackResponse { role_id, feedback }))
}

/// GET /api/v1/roles/:role_id/stages/:stage_id/next
pub async fn handle_next_stage(
    State(state): State<AppState>,
    Path((role_id, stage_id)): Path<(String, String)>,
) -> Result<Json<NextStageResponse>, AppError> {
    let role = state.store.role(&role_id).await?;
    if role.stage(&stage_id).is_none() {
        return Err(AppError::NotFound(format!("Stage {stage_id} not found")));
    }
    Ok(Json(NextStageResponse {
        next_stage: role.next_stage(&stage_id).cloned(),
    }))
}

// ── Sessions ───────────────────────────────────────────────────────────────

fn find_session(role: &Role, session_id: &str) -> Result<InterviewSession, AppError> {
    role.session(session_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} not found")))
}

/// GET /api/v1/roles/:role_id/sessions/:session_id/transcript
pub async fn handle_export_transcript(
    State(state): State<AppState>,
    Path((role_id, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.store.role(&role_id).await?;
    let session = find_session(&role, &session_id)?;
    let profile = state.store.profile().await?;

    let markdown =
        render_session_markdown(&role, &session, profile.as_ref().map(|p| p.name.as_str()));
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown,
    ))
}

/// POST /api/v1/roles/:role_id/sessions/:session_id/analysis
///
/// Evaluates a stored session once and attaches the result. When an archive
/// is configured the report is uploaded afterwards; upload failures are
/// logged only.
pub async fn handle_analyze_session(
    State(state): State<AppState>,
    Path((role_id, session_id)): Path<(String, String)>,
) -> Result<Json<InterviewSession>, AppError> {
    let role = state.store.role(&role_id).await?;
    let session = find_session(&role, &session_id)?;
    if session.analysis.is_some() {
        return Err(AppError::InvalidState(format!(
            "Session {session_id} has already been analysed"
        )));
    }

    // The stage may have been edited away since the session ran.
    let stage = role.stage(&session.stage_id).cloned().unwrap_or_else(|| {
        InterviewStage::new(&session.stage_id, &session.stage_name, "")
    });
    let profile = state.store.profile().await?;
    let context = InterviewContext::assemble(
        profile.as_ref(),
        &role,
        &stage,
        summarize_feedback(&role),
    );

    let analysis = state.evaluator.evaluate(&session.transcript, &context).await?;
    let session = state
        .store
        .attach_analysis(&role_id, &session_id, analysis)
        .await?;
    info!(
        "Session {session_id} analysed: score {}",
        session.analysis.as_ref().map(|a| a.score).unwrap_or_default()
    );

    if let Some(archive) = &state.archive {
        let markdown =
            render_session_markdown(&role, &session, profile.as_ref().map(|p| p.name.as_str()));
        if let Err(e) = archive
            .upload_markdown(&archive_key(&role_id, &session_id), markdown)
            .await
        {
            warn!("Transcript archive failed for session {session_id}: {e}");
        }
    }

    Ok(Json(session))
}

// ── Selection ──────────────────────────────────────────────────────────────

/// GET /api/v1/selection
pub async fn handle_get_selection(
    State(state): State<AppState>,
) -> Result<Json<ActiveSelection>, AppError> {
    Ok(Json(state.store.selection().await?))
}

/// PUT /api/v1/selection
pub async fn handle_put_selection(
    State(state): State<AppState>,
    Json(req): Json<ActiveSelection>,
) -> Result<Json<ActiveSelection>, AppError> {
    match &req.role_id {
        Some(role_id) => {
            let role = state.store.role(role_id).await?;
            if let Some(stage_id) = &req.stage_id {
                if role.stage(stage_id).is_none() {
                    return Err(AppError::NotFound(format!("Stage {stage_id} not found")));
                }
            }
        }
        None if req.stage_id.is_some() || req.session_id.is_some() => {
            return Err(AppError::Validation(
                "A stage or session selection needs a role".to_string(),
            ))
        }
        None => {}
    }

    state.store.set_selection(&req).await?;
    Ok(Json(req))
}
