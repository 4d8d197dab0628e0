use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::interview::handlers::prepare_context;
use crate::interview::prompts::{build_instructions, TurnKind};
use crate::models::session::{InterviewSession, Message};
use crate::state::AppState;
use crate::store::repository::generate_id;
use crate::store::ActiveSelection;

#[derive(Debug, Deserialize)]
pub struct RealtimeSessionRequest {
    pub role_id: String,
    #[serde(default)]
    pub stage_id: Option<String>,
}

/// Ephemeral credential for a client that negotiates the peer connection itself.
#[derive(Debug, Serialize)]
pub struct RealtimeSessionResponse {
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub client_secret: String,
    pub expires_at: Option<i64>,
    pub stage_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeTranscriptRequest {
    pub role_id: String,
    pub stage_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub transcript: Vec<Message>,
}

/// POST /api/v1/realtime/session
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<RealtimeSessionRequest>,
) -> Result<Json<RealtimeSessionResponse>, AppError> {
    let (role, stage, context) =
        prepare_context(&state, &req.role_id, req.stage_id.as_deref()).await?;
    if context.role_title().is_none() {
        return Err(AppError::Validation("Role title is required".to_string()));
    }

    let instructions = build_instructions(&context, &[], TurnKind::Opening);
    let session = state.negotiator.create_session(&instructions).await?;
    let client_secret = session
        .secret()
        .ok_or_else(|| {
            AppError::MalformedResponse("Session response is missing a client secret".to_string())
        })?
        .to_string();

    info!(
        "Realtime session issued for role {} ({})",
        role.id, stage.name
    );
    Ok(Json(RealtimeSessionResponse {
        session_id: session.id,
        model: session.model,
        client_secret,
        expires_at: session
            .client_secret
            .as_ref()
            .and_then(|s| s.expires_at)
            .or(session.expires_at),
        stage_id: stage.id,
    }))
}

/// POST /api/v1/realtime/transcripts
///
/// Stores the transcript accumulated by a realtime session on its role.
pub async fn handle_save_transcript(
    State(state): State<AppState>,
    Json(req): Json<RealtimeTranscriptRequest>,
) -> Result<(StatusCode, Json<InterviewSession>), AppError> {
    if req.transcript.is_empty() {
        return Err(AppError::Validation("Transcript is empty".to_string()));
    }

    let role = state.store.role(&req.role_id).await?;
    let stage = role
        .stage(&req.stage_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Stage {} not found", req.stage_id)))?;

    let ended_at = req.ended_at.unwrap_or_else(|| state.clock.now());
    if ended_at < req.started_at {
        return Err(AppError::Validation(
            "ended_at must not precede started_at".to_string(),
        ));
    }

    let session = InterviewSession {
        id: generate_id(),
        stage_id: stage.id.clone(),
        stage_name: stage.name,
        started_at: req.started_at,
        ended_at,
        transcript: req.transcript,
        analysis: None,
    };

    state.store.add_session(&role.id, session.clone()).await?;
    state
        .store
        .set_selection(&ActiveSelection {
            role_id: Some(role.id.clone()),
            stage_id: Some(stage.id),
            session_id: Some(session.id.clone()),
        })
        .await?;

    info!(
        "Realtime session {} stored on role {} ({} messages)",
        session.id,
        role.id,
        session.transcript.len()
    );
    Ok((StatusCode::CREATED, Json(session)))
}
