//! Company research: categories, the progress stream hub, the background
//! orchestrator and the `fetch_page` tool it can offer the model.

pub mod categories;
pub mod fetch;
pub mod handlers;
pub mod hub;
pub mod orchestrator;
pub mod prompts;

pub use hub::{ProgressEvent, ProgressHub, StreamFrame};
pub use orchestrator::{ResearchOrchestrator, RunStatus};
