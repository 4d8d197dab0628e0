use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::documents::extract::{extract_profile, extract_role, ProfileDraft, RoleDraft};
use crate::documents::DocumentError;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ParsedDocument {
    pub file_name: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
}

struct Upload {
    data: Bytes,
    file_name: String,
    media_type: Option<String>,
}

/// POST /api/v1/documents/parse
///
/// Multipart body with one `file` field.
pub async fn handle_parse_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ParsedDocument>, AppError> {
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document").to_string();
        let media_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
        upload = Some(Upload {
            data,
            file_name,
            media_type,
        });
    }

    let Upload {
        data,
        file_name,
        media_type,
    } = upload.ok_or_else(|| AppError::Validation("File is required".to_string()))?;

    // PDF extraction is CPU-bound.
    let converter = state.converter.clone();
    let name = file_name.clone();
    let text = tokio::task::spawn_blocking(move || {
        converter.convert(&data, media_type.as_deref(), &name)
    })
    .await
    .map_err(|e| DocumentError::ParseFailure {
        file_name: file_name.clone(),
        reason: e.to_string(),
    })??;

    info!("Parsed {file_name}: {} chars", text.chars().count());
    Ok(Json(ParsedDocument { file_name, text }))
}

/// POST /api/v1/documents/profile
pub async fn handle_extract_profile(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ProfileDraft>, AppError> {
    Ok(Json(extract_profile(&state.llm, &req.text).await?))
}

/// POST /api/v1/documents/role
pub async fn handle_extract_role(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<RoleDraft>, AppError> {
    Ok(Json(extract_role(&state.llm, &req.text).await?))
}
