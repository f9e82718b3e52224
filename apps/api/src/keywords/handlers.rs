use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::keywords::KeywordExtraction;
use crate::routes::RoleQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PatternsResponse {
    /// Normalized keyword -> success rate, limited to patterns above the confidence threshold.
    pub patterns: BTreeMap<String, f64>,
    pub min_confidence: i32,
}

/// POST /api/v1/applications/:id/keywords/extract
pub async fn handle_extract_keywords(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<KeywordExtraction>, AppError> {
    let result = state
        .keywords
        .extract_for_application(query.role_id, id)
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/keywords/patterns
pub async fn handle_get_patterns(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<PatternsResponse>, AppError> {
    let patterns = state
        .keywords
        .learning()
        .get_keyword_patterns(query.role_id)
        .await?;
    Ok(Json(PatternsResponse {
        patterns: patterns.into_iter().collect(),
        min_confidence: state.config.keyword_min_confidence,
    }))
}
