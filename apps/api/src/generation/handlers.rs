//! Axum route handlers for the Generation API.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::enrichment::EnrichmentResponse;
use crate::generation::generator::GeneratedDocument;
use crate::routes::RoleQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CoverLetterRequest {
    /// formal | conversational | match_culture. Anything else means formal.
    pub tone: Option<String>,
}

/// POST /api/v1/applications/:id/generate/resume
pub async fn handle_generate_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<GeneratedDocument>, AppError> {
    let document = state.generation.generate_resume(query.role_id, id).await?;
    Ok(Json(document))
}

/// POST /api/v1/applications/:id/generate/cover-letter
///
/// The body is optional; a missing or unreadable body uses the default tone.
pub async fn handle_generate_cover_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
    body: Option<Json<CoverLetterRequest>>,
) -> Result<Json<GeneratedDocument>, AppError> {
    let tone = body.and_then(|Json(request)| request.tone);
    let document = state
        .generation
        .generate_cover_letter(query.role_id, id, tone.as_deref())
        .await?;
    Ok(Json(document))
}

/// POST /api/v1/applications/:id/enrich
pub async fn handle_enrich(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<EnrichmentResponse>, AppError> {
    Ok(Json(state.generation.enrich(query.role_id, id).await?))
}
