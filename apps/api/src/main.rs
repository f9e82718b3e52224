mod config;
mod constraints;
mod db;
mod errors;
mod generation;
mod keywords;
mod lifecycle;
mod llm_client;
mod models;
mod research;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::constraints::ConstraintConfig;
use crate::db::create_pool;
use crate::generation::GenerationOrchestrator;
use crate::keywords::{KeywordLearning, KeywordPipeline};
use crate::lifecycle::Lifecycle;
use crate::llm_client::build_gateway;
use crate::research::fetch::{HttpPageFetcher, PageFetcher};
use crate::research::{ProgressHub, ResearchOrchestrator};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{CallRecorder, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hireflow API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(pool));

    // Initialize LLM gateway (backend + breaker, retry, pacer)
    let recorder: Arc<dyn CallRecorder> = store.clone();
    let gateway = build_gateway(&config, Some(recorder));
    info!(
        "LLM gateway initialized (provider: {}, model: {})",
        gateway.provider(),
        gateway.model()
    );

    // Research page fetching is optional; research still runs without it.
    let fetcher: Option<Arc<dyn PageFetcher>> = if config.research_fetch_enabled {
        Some(Arc::new(HttpPageFetcher))
    } else {
        info!("Page fetch tool disabled");
        None
    };

    // Wire the pipelines
    let learning = Arc::new(KeywordLearning::new(
        store.clone(),
        config.keyword_min_confidence,
    ));
    let lifecycle = Arc::new(Lifecycle::new(
        store.clone(),
        learning.clone(),
        config.manual_context_max_chars,
    ));
    let keywords = Arc::new(KeywordPipeline::new(
        gateway.clone(),
        store.clone(),
        learning,
        lifecycle.clone(),
        config.keyword_boost_weight,
    ));
    let hub = Arc::new(ProgressHub::new(config.sse_idle_timeout));
    let research = Arc::new(ResearchOrchestrator::new(
        gateway.clone(),
        store.clone(),
        lifecycle.clone(),
        hub.clone(),
        fetcher,
    ));
    let generation = Arc::new(GenerationOrchestrator::new(
        gateway,
        store.clone(),
        store.clone(),
        lifecycle.clone(),
        ConstraintConfig {
            max_line_length: config.max_line_length,
        },
    ));

    // Build app state
    let state = AppState {
        config: config.clone(),
        applications: store,
        lifecycle,
        keywords,
        research,
        hub,
        generation,
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()), // TODO: restrict origins once the web client's host is fixed
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
