// Document generation: prompt context assembly, resume and cover letter
// generation through the constraint engine, and enrichment analysis.
// All LLM calls go through llm_client; no provider calls here.

pub mod context;
pub mod enrichment;
pub mod generator;
pub mod handlers;
pub mod prompts;
pub mod tone;

pub use generator::{DocumentKind, GeneratedDocument, GenerationOrchestrator};
