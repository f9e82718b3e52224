pub mod health;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::generation::handlers as generation;
use crate::keywords::handlers as keywords;
use crate::lifecycle::handlers as lifecycle;
use crate::research::handlers as research;
use crate::state::AppState;

/// Owning identity on every API call. Authentication happens upstream.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RoleQuery {
    pub role_id: Uuid,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Applications + lifecycle
        .route(
            "/api/v1/applications",
            post(lifecycle::handle_create_application),
        )
        .route(
            "/api/v1/applications/:id",
            get(lifecycle::handle_get_application),
        )
        .route(
            "/api/v1/applications/:id/status",
            patch(lifecycle::handle_update_status),
        )
        .route(
            "/api/v1/applications/:id/context",
            put(lifecycle::handle_set_manual_context),
        )
        // Keywords
        .route(
            "/api/v1/applications/:id/keywords/extract",
            post(keywords::handle_extract_keywords),
        )
        .route("/api/v1/keywords/patterns", get(keywords::handle_get_patterns))
        // Research
        .route(
            "/api/v1/applications/:id/research",
            post(research::handle_start_research).delete(research::handle_cancel_research),
        )
        .route(
            "/api/v1/applications/:id/research/stream",
            get(research::handle_research_stream),
        )
        .route(
            "/api/v1/applications/:id/research/status",
            get(research::handle_research_status),
        )
        .route(
            "/api/v1/applications/:id/research/approve",
            post(lifecycle::handle_approve_research),
        )
        // Generation
        .route(
            "/api/v1/applications/:id/generate/resume",
            post(generation::handle_generate_resume),
        )
        .route(
            "/api/v1/applications/:id/generate/cover-letter",
            post(generation::handle_generate_cover_letter),
        )
        .route(
            "/api/v1/applications/:id/enrich",
            post(generation::handle_enrich),
        )
        .with_state(state)
}
