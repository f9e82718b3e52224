//! Keyword pipeline: extraction, pattern-boosted ranking and usage recording.
//!
//! Flow for one application:
//!   extract_keywords → base score (priority / 10) → visible patterns →
//!   apply_pattern_boost → persist keyword JSON → record_keyword_usage →
//!   created → keywords (when still created)
//!
//! Extraction is refused once research has been approved. Re-extraction only
//! counts usage for keywords the application did not already carry.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::lifecycle::Lifecycle;
use crate::llm_client::{CallTrace, LlmGateway};
use crate::models::application::{Application, ApplicationStatus, ApplicationUpdate};
use crate::models::keyword::{normalize_keyword, Keyword};
use crate::store::ApplicationStore;

pub mod extractor;
pub mod handlers;
pub mod learning;
pub mod prompts;

pub use extractor::extract_keywords;
pub use learning::{apply_pattern_boost, KeywordLearning, ScoredKeyword};

#[derive(Debug, Serialize)]
pub struct KeywordExtraction {
    pub application_id: Uuid,
    pub status: ApplicationStatus,
    pub keywords: Vec<ScoredKeyword>,
    pub boosted_count: usize,
    /// Learned patterns that were visible to ranking.
    pub patterns_considered: usize,
}

pub struct KeywordPipeline {
    gateway: Arc<dyn LlmGateway>,
    applications: Arc<dyn ApplicationStore>,
    learning: Arc<KeywordLearning>,
    lifecycle: Arc<Lifecycle>,
    boost_weight: f64,
}

impl KeywordPipeline {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        applications: Arc<dyn ApplicationStore>,
        learning: Arc<KeywordLearning>,
        lifecycle: Arc<Lifecycle>,
        boost_weight: f64,
    ) -> Self {
        Self {
            gateway,
            applications,
            learning,
            lifecycle,
            boost_weight,
        }
    }

    pub fn learning(&self) -> &KeywordLearning {
        &self.learning
    }

    pub async fn extract_for_application(
        &self,
        role_id: Uuid,
        application_id: Uuid,
    ) -> Result<KeywordExtraction, AppError> {
        let application = self.applications.get(role_id, application_id).await?;
        if application.status.rank() > ApplicationStatus::Researching.rank() {
            return Err(AppError::Precondition(format!(
                "Keywords can only be extracted before research is approved; application is '{}'",
                application.status
            )));
        }
        let previous: HashSet<String> = application
            .parsed_keywords()
            .iter()
            .map(|k| normalize_keyword(&k.text))
            .collect();
        let posting = application
            .job_posting
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                AppError::Validation("Application has no job posting to extract from".to_string())
            })?;

        let trace = CallTrace {
            role_id: Some(role_id),
            application_id: Some(application_id),
        };
        let extracted = extract_keywords(self.gateway.as_ref(), posting, trace).await?;

        let patterns = self.learning.get_keyword_patterns(role_id).await?;
        let scored = extracted.into_iter().map(ScoredKeyword::from_priority).collect();
        let ranked = apply_pattern_boost(scored, &patterns, self.boost_weight);
        let boosted_count = ranked.iter().filter(|s| s.keyword.pattern_boosted).count();

        let keywords: Vec<Keyword> = ranked.iter().map(|s| s.keyword.clone()).collect();
        let keywords_json = serde_json::to_value(&keywords)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize keywords: {e}")))?;
        let mut application = self
            .applications
            .update(
                role_id,
                application_id,
                ApplicationUpdate {
                    keywords: Some(keywords_json),
                    ..Default::default()
                },
            )
            .await?;

        let new_texts: Vec<String> = keywords
            .iter()
            .filter(|k| !previous.contains(&normalize_keyword(&k.text)))
            .map(|k| k.text.clone())
            .collect();
        self.learning.record_keyword_usage(role_id, &new_texts).await?;

        if application.status == ApplicationStatus::Created {
            application = self.advance(&application).await?;
        }

        info!(
            application_id = %application_id,
            "Ranked {} keywords ({} pattern-boosted)",
            ranked.len(),
            boosted_count
        );

        Ok(KeywordExtraction {
            application_id,
            status: application.status,
            keywords: ranked,
            boosted_count,
            patterns_considered: patterns.len(),
        })
    }

    async fn advance(&self, application: &Application) -> Result<Application, AppError> {
        self.lifecycle
            .transition(
                application.role_id,
                application.id,
                ApplicationStatus::Keywords,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::testing::MockGateway;

    const EXTRACTED: &str = r#"{"keywords": [
        {"text": "Python", "priority": 5, "category": "technical_skill"},
        {"text": "Rust", "priority": 6, "category": "technical_skill"}
    ]}"#;

    fn pipeline(store: Arc<MemoryStore>, gateway: Arc<MockGateway>) -> KeywordPipeline {
        let learning = Arc::new(KeywordLearning::new(store.clone(), 1));
        let lifecycle = Arc::new(Lifecycle::new(store.clone(), learning.clone(), 5000));
        KeywordPipeline::new(gateway, store, learning, lifecycle, 0.3)
    }

    #[tokio::test]
    async fn test_extraction_persists_boosts_and_advances_status() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Created).await;

        // Python has one prior use and one success.
        let learning = KeywordLearning::new(store.clone(), 1);
        learning.record_keyword_usage(role, &["python".into()]).await.unwrap();
        let mut seeded = store.pattern(role, "python").unwrap();
        seeded.times_successful = 1;
        seeded.recompute_rate();
        crate::store::KeywordPatternStore::upsert_many(store.as_ref(), role, &[seeded])
            .await
            .unwrap();

        gateway.push_text(EXTRACTED);
        let result = pipeline(store.clone(), gateway)
            .extract_for_application(role, app.id)
            .await
            .unwrap();

        assert_eq!(result.status, ApplicationStatus::Keywords);
        assert_eq!(result.boosted_count, 1);
        assert_eq!(result.keywords[0].keyword.text, "Python");

        let stored = store.get(role, app.id).await.unwrap().parsed_keywords();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|k| k.text == "Python" && k.pattern_boosted));
        assert_eq!(store.pattern(role, "python").unwrap().times_used, 2);
        assert_eq!(store.pattern(role, "rust").unwrap().times_used, 1);
    }

    #[tokio::test]
    async fn test_re_extraction_keeps_later_status() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Researching).await;

        gateway.push_text(EXTRACTED);
        let result = pipeline(store, gateway)
            .extract_for_application(role, app.id)
            .await
            .unwrap();
        assert_eq!(result.status, ApplicationStatus::Researching);
    }

    #[tokio::test]
    async fn test_re_extraction_counts_only_new_keywords() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Created).await;
        let pipeline = pipeline(store.clone(), gateway.clone());

        gateway.push_text(EXTRACTED);
        pipeline.extract_for_application(role, app.id).await.unwrap();
        gateway.push_text(
            r#"{"keywords": [
                {"text": "rust", "priority": 7, "category": "technical_skill"},
                {"text": "Kafka", "priority": 4, "category": "tool"}
            ]}"#,
        );
        pipeline.extract_for_application(role, app.id).await.unwrap();

        assert_eq!(store.pattern(role, "rust").unwrap().times_used, 1);
        assert_eq!(store.pattern(role, "python").unwrap().times_used, 1);
        assert_eq!(store.pattern(role, "kafka").unwrap().times_used, 1);
    }

    #[tokio::test]
    async fn test_extraction_refused_after_research_is_approved() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Callback).await;

        gateway.push_text(EXTRACTED);
        let err = pipeline(store.clone(), gateway.clone())
            .extract_for_application(role, app.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
        assert_eq!(gateway.call_count(), 0);
        assert!(store.pattern(role, "rust").is_none());
    }
}
