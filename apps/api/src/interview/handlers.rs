use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::interview::budget::{Directive, TurnBudget};
use crate::interview::engine::{EngineState, InterviewEngine};
use crate::interview::registry::LiveInterview;
use crate::models::context::InterviewContext;
use crate::models::role::{InterviewStage, Role};
use crate::models::session::{InterviewSession, Message};
use crate::state::AppState;
use crate::store::repository::{generate_id, summarize_feedback};
use crate::store::ActiveSelection;

const DEFAULT_STAGE_ID: &str = "screening";

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    pub role_id: String,
    /// Falls back to the "screening" stage, or the role's first stage.
    #[serde(default)]
    pub stage_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
}

/// Live view of one interview.
#[derive(Debug, Serialize)]
pub struct InterviewView {
    pub id: String,
    pub role_id: String,
    pub stage_id: String,
    pub stage_name: String,
    pub state: EngineState,
    pub messages: Vec<Message>,
    pub budget: Option<TurnBudget>,
    pub directives: Vec<Directive>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub reply: Message,
    pub interview: InterviewView,
}

impl InterviewView {
    fn of(live: &LiveInterview) -> Self {
        let budget = live.engine.budget();
        Self {
            id: live.id.clone(),
            role_id: live.role_id.clone(),
            stage_id: live.stage.id.clone(),
            stage_name: live.stage.name.clone(),
            state: live.engine.state(),
            messages: live.engine.messages().to_vec(),
            directives: budget.map(|b| b.directives()).unwrap_or_default(),
            budget,
            started_at: live.engine.started_at(),
        }
    }
}

pub(crate) fn pick_stage(stages: &[InterviewStage], stage_id: Option<&str>) -> Result<InterviewStage, AppError> {
    match stage_id {
        Some(id) => stages
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Stage {id} not found"))),
        None => stages
            .iter()
            .find(|s| s.id == DEFAULT_STAGE_ID)
            .or_else(|| stages.first())
            .cloned()
            .ok_or_else(|| AppError::Validation("Role has no interview stages".to_string())),
    }
}

/// Loads the role and profile and assembles the context for one stage.
pub(crate) async fn prepare_context(
    state: &AppState,
    role_id: &str,
    stage_id: Option<&str>,
) -> Result<(Role, InterviewStage, InterviewContext), AppError> {
    let role = state.store.role(role_id).await?;
    let stage = pick_stage(&role.stages, stage_id)?;
    let profile = state.store.profile().await?;

    let context = InterviewContext::assemble(
        profile.as_ref(),
        &role,
        &stage,
        summarize_feedback(&role),
    );
    Ok((role, stage, context))
}

/// POST /api/v1/interviews
pub async fn handle_start_interview(
    State(state): State<AppState>,
    Json(req): Json<StartInterviewRequest>,
) -> Result<(StatusCode, Json<InterviewView>), AppError> {
    let (role, stage, context) =
        prepare_context(&state, &req.role_id, req.stage_id.as_deref()).await?;

    let mut engine = InterviewEngine::new(state.reasoning.clone(), state.clock.clone());
    engine.start_interview(context).await?;

    let live = LiveInterview {
        id: generate_id(),
        role_id: role.id.clone(),
        stage,
        engine,
        persisted: false,
    };
    let view = InterviewView::of(&live);
    state.interviews.insert(live).await;

    info!(
        "Live interview {} started for role {} ({})",
        view.id, view.role_id, view.stage_name
    );
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/interviews/:id
pub async fn handle_get_interview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InterviewView>, AppError> {
    let entry = state.interviews.get(&id).await?;
    let live = entry.lock().await;
    Ok(Json(InterviewView::of(&live)))
}

/// POST /api/v1/interviews/:id/turns
pub async fn handle_send_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let entry = match state.interviews.get(&id).await {
        Ok(entry) => entry,
        Err(AppError::NotFound(msg)) => {
            if stored_session(&state, &id).await?.is_some() {
                return Err(AppError::InvalidState(format!("Interview {id} has ended")));
            }
            return Err(AppError::NotFound(msg));
        }
        Err(e) => return Err(e),
    };
    let mut live = entry.lock().await;

    let reply = live.engine.send_turn(&req.text).await?;
    Ok(Json(TurnResponse {
        reply,
        interview: InterviewView::of(&live),
    }))
}

/// Looks up an ended interview among the sessions stored on roles.
async fn stored_session(state: &AppState, id: &str) -> Result<Option<InterviewSession>, AppError> {
    let roles = state.store.roles().await?;
    Ok(roles.iter().find_map(|role| role.session(id).cloned()))
}

/// POST /api/v1/interviews/:id/end
///
/// Ends the interview, stores it on the role and drops it from the live
/// registry. Repeated calls return the stored session without writing it
/// again.
pub async fn handle_end_interview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InterviewSession>, AppError> {
    let entry = match state.interviews.get(&id).await {
        Ok(entry) => entry,
        Err(AppError::NotFound(msg)) => {
            return stored_session(&state, &id)
                .await?
                .map(Json)
                .ok_or(AppError::NotFound(msg));
        }
        Err(e) => return Err(e),
    };
    let mut live = entry.lock().await;

    // A concurrent end may have persisted it while this call waited.
    if live.persisted {
        let role = state.store.role(&live.role_id).await?;
        return role
            .session(&live.id)
            .cloned()
            .map(Json)
            .ok_or_else(|| AppError::NotFound(format!("Interview {id} not found")));
    }

    let finished = live.engine.end_interview()?;
    let session = InterviewSession {
        id: live.id.clone(),
        stage_id: live.stage.id.clone(),
        stage_name: live.stage.name.clone(),
        started_at: finished.started_at,
        ended_at: finished.ended_at,
        transcript: finished.transcript,
        analysis: None,
    };

    state.store.add_session(&live.role_id, session.clone()).await?;
    state
        .store
        .set_selection(&ActiveSelection {
            role_id: Some(live.role_id.clone()),
            stage_id: Some(live.stage.id.clone()),
            session_id: Some(live.id.clone()),
        })
        .await?;
    live.persisted = true;
    state.interviews.remove(&live.id).await;
    info!("Live interview {} ended and persisted", live.id);

    Ok(Json(session))
}
