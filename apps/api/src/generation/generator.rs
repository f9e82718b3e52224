//! Document Generation: orchestrates resume and cover letter generation.
//!
//! Flow: status gate (reviewed | generating) → reviewed → generating →
//!       generation_status in-progress → prompt context → LLM generate →
//!       constraint engine → persist text, fixes, warnings → complete.
//!
//! Any failure after the in-progress mark flips `generation_status` to failed
//! before the error is returned.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::constraints::{enforce_constraints_with, ConstraintConfig, ConstraintResult};
use crate::errors::AppError;
use crate::generation::context::PromptContext;
use crate::generation::enrichment::{enrichment_prompt, parse_suggestions, EnrichmentResponse};
use crate::generation::prompts::{
    COVER_LETTER_PROMPT_TEMPLATE, COVER_LETTER_SYSTEM, RESUME_PROMPT_TEMPLATE, RESUME_SYSTEM,
};
use crate::generation::tone::CoverLetterTone;
use crate::lifecycle::Lifecycle;
use crate::llm_client::prompts::{
    render_template, GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM, STYLE_INSTRUCTION,
};
use crate::llm_client::{FinishReason, LlmGateway, LlmRequest};
use crate::models::application::{
    Application, ApplicationStatus, ApplicationUpdate, GenerationStatus,
};
use crate::store::{ApplicationStore, ExperienceStore};

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
}

impl DocumentKind {
    fn in_progress(&self) -> GenerationStatus {
        match self {
            DocumentKind::Resume => GenerationStatus::GeneratingResume,
            DocumentKind::CoverLetter => GenerationStatus::GeneratingCoverLetter,
        }
    }

    fn prompt_name(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume_generation",
            DocumentKind::CoverLetter => "cover_letter_generation",
        }
    }

    fn system_prompt(&self) -> String {
        let base = match self {
            DocumentKind::Resume => RESUME_SYSTEM,
            DocumentKind::CoverLetter => COVER_LETTER_SYSTEM,
        };
        format!("{base}\n\n{STYLE_INSTRUCTION}\n\n{GROUNDING_INSTRUCTION}")
    }
}

/// Response returned to the caller after a successful generation.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    pub application_id: Uuid,
    pub document: DocumentKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<CoverLetterTone>,
    pub violations_fixed: usize,
    pub violations_remaining: usize,
    pub warnings: Vec<String>,
    /// The model stopped at its token limit; `content` may end mid-sentence.
    pub truncated: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

pub struct GenerationOrchestrator {
    gateway: Arc<dyn LlmGateway>,
    applications: Arc<dyn ApplicationStore>,
    experience: Arc<dyn ExperienceStore>,
    lifecycle: Arc<Lifecycle>,
    constraint_config: ConstraintConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        applications: Arc<dyn ApplicationStore>,
        experience: Arc<dyn ExperienceStore>,
        lifecycle: Arc<Lifecycle>,
        constraint_config: ConstraintConfig,
    ) -> Self {
        Self {
            gateway,
            applications,
            experience,
            lifecycle,
            constraint_config,
        }
    }

    pub async fn generate_resume(
        &self,
        role_id: Uuid,
        application_id: Uuid,
    ) -> Result<GeneratedDocument, AppError> {
        self.generate(role_id, application_id, DocumentKind::Resume, None)
            .await
    }

    /// Unknown tones fall back to formal.
    pub async fn generate_cover_letter(
        &self,
        role_id: Uuid,
        application_id: Uuid,
        tone: Option<&str>,
    ) -> Result<GeneratedDocument, AppError> {
        let tone = CoverLetterTone::parse_lenient(tone);
        self.generate(
            role_id,
            application_id,
            DocumentKind::CoverLetter,
            Some(tone),
        )
        .await
    }

    async fn generate(
        &self,
        role_id: Uuid,
        application_id: Uuid,
        kind: DocumentKind,
        tone: Option<CoverLetterTone>,
    ) -> Result<GeneratedDocument, AppError> {
        // Step 1: Status gate
        let mut application = self.applications.get(role_id, application_id).await?;
        match application.status {
            ApplicationStatus::Generating => {}
            ApplicationStatus::Reviewed => {
                application = self
                    .lifecycle
                    .transition(role_id, application_id, ApplicationStatus::Generating)
                    .await?;
            }
            other => {
                return Err(AppError::Precondition(format!(
                    "Documents can only be generated once research is reviewed; application is '{other}'"
                )));
            }
        }

        // Step 2: Mark in progress
        self.applications
            .update(
                role_id,
                application_id,
                ApplicationUpdate::generation_status(kind.in_progress()),
            )
            .await?;

        match self.run(&application, kind, tone).await {
            Ok(document) => Ok(document),
            Err(e) => {
                let active_gaps = application
                    .research()
                    .map(|r| r.gaps)
                    .unwrap_or_default();
                error!(
                    application_id = %application_id,
                    document = ?kind,
                    active_gaps = ?active_gaps,
                    "Generation failed: {e}"
                );
                if let Err(mark_err) = self
                    .applications
                    .update(
                        role_id,
                        application_id,
                        ApplicationUpdate::generation_status(GenerationStatus::Failed),
                    )
                    .await
                {
                    warn!(
                        application_id = %application_id,
                        "Failed to mark generation as failed: {mark_err}"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        application: &Application,
        kind: DocumentKind,
        tone: Option<CoverLetterTone>,
    ) -> Result<GeneratedDocument, AppError> {
        let role_id = application.role_id;

        // Step 3: Prompt context
        let skills = self.experience.skills(role_id).await?;
        let accomplishments = self.experience.accomplishments(role_id).await?;
        let context = PromptContext::build(application, &skills, &accomplishments);
        if let Some(note) = &context.gap_note {
            info!(application_id = %application.id, "Generating with research gaps: {note}");
        }
        let prompt = render_prompt(kind, &context, tone);

        // Step 4: LLM generate
        let request = LlmRequest::new(kind.prompt_name(), &kind.system_prompt(), prompt)
            .traced(role_id, application.id);
        let completion = self
            .gateway
            .generate(&request)
            .await
            .map_err(|e| AppError::from_llm("Document generation failed", e))?;

        let truncated = completion.finish_reason == FinishReason::MaxTokens;
        if truncated {
            warn!(
                application_id = %application.id,
                document = ?kind,
                "Output hit the token limit; keeping the truncated text"
            );
        }

        // Step 5: Constraint engine
        let checked = enforce_constraints_with(&completion.text, &self.constraint_config);
        if checked.text.trim().is_empty() {
            return Err(AppError::Llm("Model returned an empty document".to_string()));
        }
        let warnings = checked.warnings();

        // Step 6: Persist
        self.applications
            .update(role_id, application.id, persist_update(kind, tone, &checked)?)
            .await?;

        info!(
            application_id = %application.id,
            document = ?kind,
            "Generated {} chars ({} fixed, {} flagged)",
            checked.text.chars().count(),
            checked.violations_fixed,
            checked.violations_remaining
        );

        Ok(GeneratedDocument {
            application_id: application.id,
            document: kind,
            content: checked.text,
            tone,
            violations_fixed: checked.violations_fixed,
            violations_remaining: checked.violations_remaining,
            warnings,
            truncated,
        })
    }

    /// Suggests experience entries the generated resume mentions but storage lacks.
    pub async fn enrich(
        &self,
        role_id: Uuid,
        application_id: Uuid,
    ) -> Result<EnrichmentResponse, AppError> {
        let application = self.applications.get(role_id, application_id).await?;
        let document = application
            .generated_resume
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                AppError::Precondition("Generate a resume before running enrichment".to_string())
            })?;

        let skills = self.experience.skills(role_id).await?;
        let accomplishments = self.experience.accomplishments(role_id).await?;
        let request = LlmRequest::new(
            "enrichment_analysis",
            JSON_ONLY_SYSTEM,
            enrichment_prompt(document, &skills, &accomplishments),
        )
        .traced(role_id, application_id);

        let completion = self
            .gateway
            .generate(&request)
            .await
            .map_err(|e| AppError::from_llm("Enrichment analysis failed", e))?;
        Ok(parse_suggestions(&completion.text, &skills, &accomplishments))
    }
}

fn render_prompt(kind: DocumentKind, context: &PromptContext, tone: Option<CoverLetterTone>) -> String {
    let template = match kind {
        DocumentKind::Resume => RESUME_PROMPT_TEMPLATE,
        DocumentKind::CoverLetter => COVER_LETTER_PROMPT_TEMPLATE,
    };
    let research = context.research_block();
    render_template(
        template,
        &[
            ("company", context.company_name.as_str()),
            ("tone", tone.unwrap_or_default().instruction()),
            ("keywords", context.keywords.as_str()),
            ("experience", context.experience.as_str()),
            ("research", research.as_str()),
            ("manual_context", context.manual_context.as_str()),
            ("job_posting", context.job_posting.as_str()),
        ],
    )
}

fn persist_update(
    kind: DocumentKind,
    tone: Option<CoverLetterTone>,
    checked: &ConstraintResult,
) -> Result<ApplicationUpdate, AppError> {
    let warnings = serde_json::to_value(checked.warnings())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize warnings: {e}")))?;
    let fixed = i32::try_from(checked.violations_fixed).unwrap_or(i32::MAX);
    let update = match kind {
        DocumentKind::Resume => ApplicationUpdate {
            generated_resume: Some(checked.text.clone()),
            resume_violations_fixed: Some(fixed),
            resume_constraint_warnings: Some(warnings),
            generation_status: Some(GenerationStatus::Complete),
            ..Default::default()
        },
        DocumentKind::CoverLetter => ApplicationUpdate {
            generated_cover_letter: Some(checked.text.clone()),
            cover_letter_tone: Some(tone.unwrap_or_default().as_str().to_string()),
            cover_letter_violations_fixed: Some(fixed),
            cover_letter_constraint_warnings: Some(warnings),
            generation_status: Some(GenerationStatus::Complete),
            ..Default::default()
        },
    };
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;

    use crate::keywords::KeywordLearning;
    use crate::llm_client::LlmError;
    use crate::models::research::{CategoryResult, ResearchResult};
    use crate::store::memory::MemoryStore;
    use crate::testing::{last_user_text, MockGateway};

    fn orchestrator(store: Arc<MemoryStore>, gateway: Arc<MockGateway>) -> GenerationOrchestrator {
        let learning = Arc::new(KeywordLearning::new(store.clone(), 1));
        let lifecycle = Arc::new(Lifecycle::new(store.clone(), learning, 5000));
        GenerationOrchestrator::new(
            gateway,
            store.clone(),
            store,
            lifecycle,
            ConstraintConfig::default(),
        )
    }

    async fn seed_research_with_gap(store: &MemoryStore, role: Uuid, id: Uuid) {
        let mut categories = BTreeMap::new();
        categories.insert(
            "company_overview".to_string(),
            CategoryResult::found("Acme builds warehouse robots.".to_string()),
        );
        categories.insert(
            "recent_news".to_string(),
            CategoryResult::not_found("nothing published"),
        );
        let research = ResearchResult {
            categories,
            gaps: vec!["recent_news".to_string()],
            completed_at: Utc::now(),
        };
        store
            .update(
                role,
                id,
                ApplicationUpdate {
                    research_data: Some(serde_json::to_value(research).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_generation_requires_reviewed_research() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Researching).await;

        let err = orchestrator(store, gateway.clone())
            .generate_resume(role, app.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_moves_reviewed_to_generating_and_persists_cleaned_text() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Reviewed).await;
        store.add_skill(role, "Rust", "language");

        gateway.push_text("Built control loops \u{2014} fast.\nWe leverage synergy.");
        let document = orchestrator(store.clone(), gateway.clone())
            .generate_resume(role, app.id)
            .await
            .unwrap();

        assert_eq!(document.content, "Built control loops - fast.\nWe leverage synergy.");
        assert_eq!(document.violations_fixed, 1);
        assert!(document.violations_remaining >= 2);
        assert!(!document.truncated);

        let stored = store.get(role, app.id).await.unwrap();
        assert_eq!(stored.status, ApplicationStatus::Generating);
        assert_eq!(stored.generation_status, GenerationStatus::Complete);
        assert_eq!(stored.generated_resume.as_deref(), Some(document.content.as_str()));
        assert_eq!(stored.resume_violations_fixed, 1);

        let requests = gateway.requests();
        assert!(last_user_text(&requests[0]).contains("- Rust (language)"));
    }

    #[tokio::test]
    async fn test_gap_note_reaches_the_prompt() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Generating).await;
        seed_research_with_gap(&store, role, app.id).await;

        gateway.push_text("Dear hiring team,\n\nI build robots.");
        orchestrator(store, gateway.clone())
            .generate_cover_letter(role, app.id, Some("conversational"))
            .await
            .unwrap();

        let requests = gateway.requests();
        let prompt = last_user_text(&requests[0]);
        assert!(prompt.contains("## Company Overview\nAcme builds warehouse robots."));
        assert!(prompt.contains("Research was unavailable for: Recent News"));
        assert!(prompt.contains(CoverLetterTone::Conversational.instruction()));
    }

    #[tokio::test]
    async fn test_placeholders_inside_user_text_stay_literal() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Generating).await;
        let notes = crate::store::SanitizedContext::new("Mention {keywords} and {job_posting}", 500)
            .unwrap();
        store.set_manual_context(role, app.id, notes).await.unwrap();

        gateway.push_text("Experience:\n- Built robots");
        orchestrator(store, gateway.clone())
            .generate_resume(role, app.id)
            .await
            .unwrap();

        let requests = gateway.requests();
        let prompt = last_user_text(&requests[0]);
        assert!(prompt.contains("Mention {keywords} and {job_posting}"));
        assert_eq!(prompt.matches("Senior Rust engineer building control systems.").count(), 1);
    }

    #[tokio::test]
    async fn test_truncated_output_is_kept() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Generating).await;

        gateway.push_completion("Experience:\n- Shipped the", FinishReason::MaxTokens);
        let document = orchestrator(store.clone(), gateway)
            .generate_resume(role, app.id)
            .await
            .unwrap();

        assert!(document.truncated);
        assert_eq!(document.content, "Experience:\n- Shipped the");
        let stored = store.get(role, app.id).await.unwrap();
        assert_eq!(stored.generation_status, GenerationStatus::Complete);
    }

    #[tokio::test]
    async fn test_failure_marks_generation_failed() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Reviewed).await;
        seed_research_with_gap(&store, role, app.id).await;

        gateway.push_error(LlmError::CircuitOpen);
        let err = orchestrator(store.clone(), gateway)
            .generate_cover_letter(role, app.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CircuitOpen));

        let stored = store.get(role, app.id).await.unwrap();
        assert_eq!(stored.generation_status, GenerationStatus::Failed);
        assert!(stored.generated_cover_letter.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tone_is_stored_as_formal() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Generating).await;

        gateway.push_text("Dear hiring team,\n\nThank you.");
        let document = orchestrator(store.clone(), gateway)
            .generate_cover_letter(role, app.id, Some("sarcastic"))
            .await
            .unwrap();

        assert_eq!(document.tone, Some(CoverLetterTone::Formal));
        let stored = store.get(role, app.id).await.unwrap();
        assert_eq!(stored.cover_letter_tone.as_deref(), Some("formal"));
    }

    #[tokio::test]
    async fn test_enrichment_requires_a_generated_resume() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Generating).await;

        let err = orchestrator(store, gateway)
            .enrich(role, app.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_enrichment_tolerates_unparseable_output() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Generating).await;
        store
            .update(
                role,
                app.id,
                ApplicationUpdate {
                    generated_resume: Some("Ran Kubernetes clusters.".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        gateway.push_text("Sorry, I cannot help with that.");
        let response = orchestrator(store, gateway)
            .enrich(role, app.id)
            .await
            .unwrap();
        assert!(response.suggestions.is_empty());
    }
}
