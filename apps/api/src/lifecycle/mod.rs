//! Application state machine.
//!
//! Two deliberately separate paths change status:
//! - `transition` is strict and table-driven: anything off the adjacency
//!   table fails with `InvalidTransition`.
//! - `approve_research` is lenient and idempotent: approving an application
//!   that is already reviewed (or later) succeeds with a message.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::keywords::KeywordLearning;
use crate::models::application::{Application, ApplicationStatus};
use crate::store::{ApplicationStore, SanitizedContext};

pub mod handlers;
pub mod transitions;

use transitions::{enters_success_region, validate_transition};

#[derive(Debug, Serialize)]
pub struct ApprovalOutcome {
    pub application: Application,
    pub already_approved: bool,
    pub message: String,
}

pub struct Lifecycle {
    applications: Arc<dyn ApplicationStore>,
    learning: Arc<KeywordLearning>,
    manual_context_max_chars: usize,
}

impl Lifecycle {
    pub fn new(
        applications: Arc<dyn ApplicationStore>,
        learning: Arc<KeywordLearning>,
        manual_context_max_chars: usize,
    ) -> Self {
        Self {
            applications,
            learning,
            manual_context_max_chars,
        }
    }

    /// Validates `current → target` against the adjacency table and persists it
    /// as a compare-and-set on `current`. Only the caller whose write lands
    /// credits the keywords on first entry into the success region.
    pub async fn transition(
        &self,
        role_id: Uuid,
        application_id: Uuid,
        target: ApplicationStatus,
    ) -> Result<Application, AppError> {
        let current = self.applications.get(role_id, application_id).await?;
        let from = current.status;
        validate_transition(from, target)?;

        let updated = self
            .applications
            .update_status(role_id, application_id, from, target)
            .await?;
        info!(application_id = %application_id, "Status {from} -> {target}");

        if enters_success_region(from, target) {
            // Learning is a side effect; the transition already happened.
            if let Err(e) = self.learning.record_application_success(&updated).await {
                warn!(
                    application_id = %application_id,
                    "Failed to record keyword success: {e}"
                );
            }
        }

        Ok(updated)
    }

    /// `researching → reviewed`, idempotent for anything already past it.
    pub async fn approve_research(
        &self,
        role_id: Uuid,
        application_id: Uuid,
    ) -> Result<ApprovalOutcome, AppError> {
        let application = self.applications.get(role_id, application_id).await?;

        if application.status.rank() >= ApplicationStatus::Reviewed.rank() {
            let message = format!(
                "Research already approved (application is {})",
                application.status
            );
            return Ok(ApprovalOutcome {
                application,
                already_approved: true,
                message,
            });
        }

        if application.status != ApplicationStatus::Researching {
            return Err(AppError::Precondition(format!(
                "Research can only be approved from 'researching'; application is '{}'",
                application.status
            )));
        }
        if application.research_data.is_none() {
            return Err(AppError::Precondition(
                "No research data to approve yet; wait for the research run to complete"
                    .to_string(),
            ));
        }

        let application = self
            .applications
            .update_status(
                role_id,
                application_id,
                ApplicationStatus::Researching,
                ApplicationStatus::Reviewed,
            )
            .await?;
        info!(application_id = %application_id, "Research approved");
        Ok(ApprovalOutcome {
            application,
            already_approved: false,
            message: "Research approved".to_string(),
        })
    }

    /// The only write path for manual context: size-capped and HTML-escaped.
    pub async fn set_manual_context(
        &self,
        role_id: Uuid,
        application_id: Uuid,
        raw: &str,
    ) -> Result<Application, AppError> {
        let sanitized = SanitizedContext::new(raw, self.manual_context_max_chars)?;
        self.applications
            .set_manual_context(role_id, application_id, sanitized)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::{ApplicationUpdate, NewApplication};
    use crate::models::keyword::{Keyword, KeywordCategory};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;

    /// Yields after every read so concurrent transitions interleave between
    /// their read and their write.
    struct InterleavingStore(Arc<MemoryStore>);

    #[async_trait]
    impl ApplicationStore for InterleavingStore {
        async fn create(&self, role_id: Uuid, input: NewApplication) -> Result<Application, AppError> {
            self.0.create(role_id, input).await
        }

        async fn get(&self, role_id: Uuid, id: Uuid) -> Result<Application, AppError> {
            let application = self.0.get(role_id, id).await;
            tokio::task::yield_now().await;
            application
        }

        async fn update(
            &self,
            role_id: Uuid,
            id: Uuid,
            update: ApplicationUpdate,
        ) -> Result<Application, AppError> {
            self.0.update(role_id, id, update).await
        }

        async fn update_status(
            &self,
            role_id: Uuid,
            id: Uuid,
            from: ApplicationStatus,
            to: ApplicationStatus,
        ) -> Result<Application, AppError> {
            self.0.update_status(role_id, id, from, to).await
        }

        async fn set_manual_context(
            &self,
            role_id: Uuid,
            id: Uuid,
            context: SanitizedContext,
        ) -> Result<Application, AppError> {
            self.0.set_manual_context(role_id, id, context).await
        }
    }

    async fn seed_sent_with_rust_keyword(store: &Arc<MemoryStore>, role: Uuid) -> Application {
        let app = store.seed(role, ApplicationStatus::Sent).await;
        let keywords = vec![Keyword {
            text: "Rust".into(),
            priority: 9,
            category: KeywordCategory::TechnicalSkill,
            pattern_boosted: false,
        }];
        store
            .update(
                role,
                app.id,
                ApplicationUpdate {
                    keywords: Some(serde_json::to_value(keywords).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    fn lifecycle(store: &Arc<MemoryStore>) -> Lifecycle {
        let learning = Arc::new(KeywordLearning::new(store.clone(), 3));
        Lifecycle::new(store.clone(), learning, 50)
    }

    #[tokio::test]
    async fn test_valid_transition_persists_and_invalid_leaves_status() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = lifecycle(&store);
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Created).await;

        let updated = lifecycle
            .transition(role, app.id, ApplicationStatus::Keywords)
            .await
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::Keywords);

        let err = lifecycle
            .transition(role, app.id, ApplicationStatus::Generating)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: ApplicationStatus::Keywords,
                to: ApplicationStatus::Generating
            }
        ));
        assert_eq!(
            store.get(role, app.id).await.unwrap().status,
            ApplicationStatus::Keywords
        );
    }

    #[tokio::test]
    async fn test_transition_rejects_other_roles() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = lifecycle(&store);
        let app = store.seed(Uuid::new_v4(), ApplicationStatus::Created).await;
        let err = lifecycle
            .transition(Uuid::new_v4(), app.id, ApplicationStatus::Keywords)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OwnershipMismatch { .. }));
    }

    #[tokio::test]
    async fn test_success_is_recorded_once_across_the_success_region() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = lifecycle(&store);
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Sent).await;

        let keywords = vec![Keyword {
            text: "Rust".into(),
            priority: 9,
            category: KeywordCategory::TechnicalSkill,
            pattern_boosted: false,
        }];
        store
            .update(
                role,
                app.id,
                ApplicationUpdate {
                    keywords: Some(serde_json::to_value(keywords).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let learning = KeywordLearning::new(store.clone(), 1);
        learning.record_keyword_usage(role, &["rust".into()]).await.unwrap();

        lifecycle
            .transition(role, app.id, ApplicationStatus::Callback)
            .await
            .unwrap();
        lifecycle
            .transition(role, app.id, ApplicationStatus::Offer)
            .await
            .unwrap();

        assert_eq!(store.pattern(role, "rust").unwrap().times_successful, 1);
    }

    #[tokio::test]
    async fn test_concurrent_transitions_from_same_status_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let learning = Arc::new(KeywordLearning::new(store.clone(), 1));
        let lifecycle = Lifecycle::new(
            Arc::new(InterleavingStore(store.clone())),
            learning.clone(),
            50,
        );
        let role = Uuid::new_v4();
        let app = seed_sent_with_rust_keyword(&store, role).await;
        learning.record_keyword_usage(role, &["rust".into()]).await.unwrap();

        let (first, second) = tokio::join!(
            lifecycle.transition(role, app.id, ApplicationStatus::Callback),
            lifecycle.transition(role, app.id, ApplicationStatus::Callback),
        );

        assert!(first.is_ok());
        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(store.pattern(role, "rust").unwrap().times_successful, 1);
    }

    #[tokio::test]
    async fn test_late_write_cannot_leave_a_terminal_status() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = Lifecycle::new(
            Arc::new(InterleavingStore(store.clone())),
            Arc::new(KeywordLearning::new(store.clone(), 3)),
            50,
        );
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Sent).await;

        let (closed, callback) = tokio::join!(
            lifecycle.transition(role, app.id, ApplicationStatus::Closed),
            lifecycle.transition(role, app.id, ApplicationStatus::Callback),
        );

        assert!(closed.is_ok());
        assert!(matches!(callback, Err(AppError::Conflict(_))));
        assert_eq!(
            store.get(role, app.id).await.unwrap().status,
            ApplicationStatus::Closed
        );
    }

    #[tokio::test]
    async fn test_approval_is_idempotent_once_reviewed() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = lifecycle(&store);
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Researching).await;
        store
            .update(
                role,
                app.id,
                ApplicationUpdate {
                    research_data: Some(serde_json::json!({"gaps": [], "completed_at": "2026-01-01T00:00:00Z"})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let first = lifecycle.approve_research(role, app.id).await.unwrap();
        assert!(!first.already_approved);
        assert_eq!(first.application.status, ApplicationStatus::Reviewed);

        let second = lifecycle.approve_research(role, app.id).await.unwrap();
        assert!(second.already_approved);
        assert!(second.message.contains("already approved"));
        assert_eq!(second.application.updated_at, first.application.updated_at);
    }

    #[tokio::test]
    async fn test_approval_preconditions() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = lifecycle(&store);
        let role = Uuid::new_v4();

        let early = store.seed(role, ApplicationStatus::Keywords).await;
        assert!(matches!(
            lifecycle.approve_research(role, early.id).await,
            Err(AppError::Precondition(_))
        ));

        let no_data = store.seed(role, ApplicationStatus::Researching).await;
        assert!(matches!(
            lifecycle.approve_research(role, no_data.id).await,
            Err(AppError::Precondition(msg)) if msg.contains("No research data")
        ));
    }

    #[tokio::test]
    async fn test_manual_context_is_sanitized_and_capped() {
        let store = Arc::new(MemoryStore::new());
        let lifecycle = lifecycle(&store);
        let role = Uuid::new_v4();
        let app = store.seed(role, ApplicationStatus::Created).await;

        let updated = lifecycle
            .set_manual_context(role, app.id, "<script>x</script>")
            .await
            .unwrap();
        assert_eq!(
            updated.manual_context.as_deref(),
            Some("&lt;script&gt;x&lt;/script&gt;")
        );

        let err = lifecycle
            .set_manual_context(role, app.id, &"x".repeat(51))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
