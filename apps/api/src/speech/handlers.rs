use axum::{
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::state::AppState;

const DEFAULT_AUDIO_FILE_NAME: &str = "recording.webm";

#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

/// POST /api/v1/speech/transcribe
///
/// Multipart body with one `audio` field.
pub async fn handle_transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, AppError> {
    let mut audio: Option<(Bytes, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let file_name = field
            .file_name()
            .unwrap_or(DEFAULT_AUDIO_FILE_NAME)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read audio: {e}")))?;
        audio = Some((data, file_name));
    }

    let (data, file_name) =
        audio.ok_or_else(|| AppError::Validation("No audio file provided".to_string()))?;
    if data.is_empty() {
        return Err(AppError::Validation("Audio file is empty".to_string()));
    }

    let text = state.llm.transcribe(data, &file_name).await?;
    Ok(Json(TranscriptionResponse { text }))
}

/// POST /api/v1/speech/synthesize
pub async fn handle_synthesize(
    State(state): State<AppState>,
    Json(req): Json<SynthesizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::Validation("Text is required".to_string()));
    }

    let audio = state.llm.synthesize(&req.text, req.voice.as_deref()).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}
