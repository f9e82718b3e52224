//! Axum route handlers for the Research API.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    Json,
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::research::ResearchResult;
use crate::research::{RunStatus, StreamFrame};
use crate::routes::RoleQuery;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ResearchStarted {
    pub application_id: Uuid,
    pub status: &'static str,
    pub stream_url: String,
}

#[derive(Debug, Serialize)]
pub struct ResearchStatusResponse {
    pub application_id: Uuid,
    /// In-memory run state, or "idle" when no run is tracked.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResearchResult>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// POST /api/v1/applications/:id/research
pub async fn handle_start_research(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<(StatusCode, Json<ResearchStarted>), AppError> {
    state.research.start_for_application(query.role_id, id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ResearchStarted {
            application_id: id,
            status: "started",
            stream_url: format!(
                "/api/v1/applications/{id}/research/stream?role_id={}",
                query.role_id
            ),
        }),
    ))
}

/// GET /api/v1/applications/:id/research/stream
///
/// `text/event-stream` of `data: {"type": "progress" | "complete" | "error", ...}` frames,
/// with comment keepalives while idle.
pub async fn handle_research_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Ownership check before exposing the queue.
    state.applications.get(query.role_id, id).await?;

    let events = state.hub.subscribe(id).map(|frame| {
        Ok(match frame {
            StreamFrame::Event(event) => match Event::default().json_data(&event) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to encode progress event: {e}");
                    Event::default().comment("encode-error")
                }
            },
            StreamFrame::KeepAlive => Event::default().comment("keepalive"),
        })
    });
    Ok(Sse::new(events))
}

/// GET /api/v1/applications/:id/research/status
pub async fn handle_research_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<ResearchStatusResponse>, AppError> {
    let application = state.applications.get(query.role_id, id).await?;
    let results = application.research();
    let status = match state.research.status(id) {
        Some(RunStatus::Pending) => "pending",
        Some(RunStatus::Running) => "running",
        Some(RunStatus::Failed) => "failed",
        Some(RunStatus::Complete) => "complete",
        None if results.is_some() => "complete",
        None => "idle",
    };
    Ok(Json(ResearchStatusResponse {
        application_id: id,
        status: status.to_string(),
        results,
    }))
}

/// DELETE /api/v1/applications/:id/research
pub async fn handle_cancel_research(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> Result<Json<CancelResponse>, AppError> {
    state.applications.get(query.role_id, id).await?;
    Ok(Json(CancelResponse {
        cancelled: state.research.cancel(id),
    }))
}
