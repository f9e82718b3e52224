use std::sync::Arc;

use crate::config::Config;
use crate::generation::GenerationOrchestrator;
use crate::keywords::KeywordPipeline;
use crate::lifecycle::Lifecycle;
use crate::research::{ProgressHub, ResearchOrchestrator};
use crate::store::ApplicationStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub applications: Arc<dyn ApplicationStore>,
    pub lifecycle: Arc<Lifecycle>,
    pub keywords: Arc<KeywordPipeline>,
    pub research: Arc<ResearchOrchestrator>,
    /// Same hub the research orchestrator publishes into; handlers subscribe here.
    pub hub: Arc<ProgressHub>,
    pub generation: Arc<GenerationOrchestrator>,
}
