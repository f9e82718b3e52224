//! Axum route handlers for application records and status changes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::lifecycle::ApprovalOutcome;
use crate::models::application::{Application, ApplicationStatus, NewApplication};
use crate::routes::RoleQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    /// Parsed by hand so a bad value is a 400 naming the accepted set.
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualContextRequest {
    pub manual_context: String,
}

/// POST /api/v1/applications
pub async fn handle_create_application(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
    Json(input): Json<NewApplication>,
) -> Result<(StatusCode, Json<Application>), AppError> {
    let application = state.applications.create(query.role_id, input).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// GET /api/v1/applications/:id
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<Application>, AppError> {
    Ok(Json(state.applications.get(query.role_id, id).await?))
}

/// PATCH /api/v1/applications/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Application>, AppError> {
    let target: ApplicationStatus = request.status.trim().parse().map_err(|e| {
        let accepted: Vec<&str> = ApplicationStatus::ALL.iter().map(|s| s.as_str()).collect();
        AppError::Validation(format!("{e}; expected one of {}", accepted.join(", ")))
    })?;
    let application = state.lifecycle.transition(query.role_id, id, target).await?;
    Ok(Json(application))
}

/// PUT /api/v1/applications/:id/context
pub async fn handle_set_manual_context(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
    Json(request): Json<ManualContextRequest>,
) -> Result<Json<Application>, AppError> {
    let application = state
        .lifecycle
        .set_manual_context(query.role_id, id, &request.manual_context)
        .await?;
    Ok(Json(application))
}

/// POST /api/v1/applications/:id/research/approve
pub async fn handle_approve_research(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<ApprovalOutcome>, AppError> {
    Ok(Json(
        state.lifecycle.approve_research(query.role_id, id).await?,
    ))
}
