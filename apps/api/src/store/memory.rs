//! In-memory store used by orchestrator and lifecycle tests. Scopes by role the
//! same way the PostgreSQL store does.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{
    Application, ApplicationStatus, ApplicationUpdate, GenerationStatus, NewApplication,
};
use crate::models::call_record::CallRecord;
use crate::models::experience::{Accomplishment, Skill};
use crate::models::keyword::KeywordPattern;
use crate::store::{
    status_conflict, ApplicationStore, CallRecorder, ExperienceStore, KeywordPatternStore,
    SanitizedContext,
};

#[derive(Default)]
pub struct MemoryStore {
    applications: Mutex<HashMap<Uuid, Application>>,
    patterns: Mutex<HashMap<(Uuid, String), KeywordPattern>>,
    skills: Mutex<Vec<Skill>>,
    accomplishments: Mutex<Vec<Accomplishment>>,
    calls: Mutex<Vec<CallRecord>>,
    /// When set, application updates touching research data fail.
    pub fail_research_writes: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_skill(&self, role_id: Uuid, name: &str, category: &str) {
        self.skills.lock().unwrap().push(Skill {
            id: Uuid::new_v4(),
            role_id,
            name: name.to_string(),
            category: Some(category.to_string()),
        });
    }

    pub fn add_accomplishment(&self, role_id: Uuid, description: &str, context: Option<&str>) {
        self.accomplishments.lock().unwrap().push(Accomplishment {
            id: Uuid::new_v4(),
            role_id,
            description: description.to_string(),
            context: context.map(str::to_string),
        });
    }

    pub fn pattern(&self, role_id: Uuid, keyword: &str) -> Option<KeywordPattern> {
        self.patterns
            .lock()
            .unwrap()
            .get(&(role_id, keyword.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    /// Creates an application and forces it into `status`, bypassing the state machine.
    pub async fn seed(&self, role_id: Uuid, status: ApplicationStatus) -> Application {
        let app = self
            .create(
                role_id,
                NewApplication {
                    company_name: Some("Acme Robotics".to_string()),
                    job_posting: Some("Senior Rust engineer building control systems.".to_string()),
                    job_url: Some("https://acme.test/jobs/42".to_string()),
                },
            )
            .await
            .unwrap();
        self.update(role_id, app.id, ApplicationUpdate::status(status))
            .await
            .unwrap()
    }

    fn scoped<'a>(
        apps: &'a mut HashMap<Uuid, Application>,
        role_id: Uuid,
        id: Uuid,
    ) -> Result<&'a mut Application, AppError> {
        match apps.get_mut(&id) {
            Some(app) if app.role_id == role_id => Ok(app),
            Some(_) => Err(AppError::OwnershipMismatch {
                entity: "Application",
                id,
                role_id,
            }),
            None => Err(AppError::NotFound(format!("Application {id} not found"))),
        }
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn create(&self, role_id: Uuid, input: NewApplication) -> Result<Application, AppError> {
        let now = Utc::now();
        let app = Application {
            id: Uuid::new_v4(),
            role_id,
            company_name: input.company_name,
            job_posting: input.job_posting,
            job_url: input.job_url,
            status: ApplicationStatus::Created,
            keywords: None,
            research_data: None,
            manual_context: None,
            generation_status: GenerationStatus::Idle,
            generated_resume: None,
            generated_cover_letter: None,
            cover_letter_tone: None,
            resume_violations_fixed: 0,
            resume_constraint_warnings: None,
            cover_letter_violations_fixed: 0,
            cover_letter_constraint_warnings: None,
            created_at: now,
            updated_at: now,
        };
        self.applications
            .lock()
            .unwrap()
            .insert(app.id, app.clone());
        Ok(app)
    }

    async fn get(&self, role_id: Uuid, id: Uuid) -> Result<Application, AppError> {
        let mut apps = self.applications.lock().unwrap();
        Self::scoped(&mut apps, role_id, id).map(|app| app.clone())
    }

    async fn update(
        &self,
        role_id: Uuid,
        id: Uuid,
        update: ApplicationUpdate,
    ) -> Result<Application, AppError> {
        if update.research_data.is_some()
            && self
                .fail_research_writes
                .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(AppError::Internal(anyhow::anyhow!("simulated write failure")));
        }
        let mut apps = self.applications.lock().unwrap();
        let app = Self::scoped(&mut apps, role_id, id)?;
        update.apply_to(app);
        Ok(app.clone())
    }

    async fn update_status(
        &self,
        role_id: Uuid,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<Application, AppError> {
        let mut apps = self.applications.lock().unwrap();
        let app = Self::scoped(&mut apps, role_id, id)?;
        if app.status != from {
            return Err(status_conflict(from, app.status));
        }
        ApplicationUpdate::status(to).apply_to(app);
        Ok(app.clone())
    }

    async fn set_manual_context(
        &self,
        role_id: Uuid,
        id: Uuid,
        context: SanitizedContext,
    ) -> Result<Application, AppError> {
        let mut apps = self.applications.lock().unwrap();
        let app = Self::scoped(&mut apps, role_id, id)?;
        app.manual_context = Some(context.into_inner());
        app.updated_at = Utc::now();
        Ok(app.clone())
    }
}

#[async_trait]
impl KeywordPatternStore for MemoryStore {
    async fn fetch(
        &self,
        role_id: Uuid,
        keywords: &[String],
    ) -> Result<Vec<KeywordPattern>, AppError> {
        let patterns = self.patterns.lock().unwrap();
        Ok(keywords
            .iter()
            .filter_map(|k| patterns.get(&(role_id, k.clone())).cloned())
            .collect())
    }

    async fn upsert_many(
        &self,
        role_id: Uuid,
        patterns: &[KeywordPattern],
    ) -> Result<(), AppError> {
        let mut stored = self.patterns.lock().unwrap();
        for p in patterns {
            stored.insert((role_id, p.keyword.clone()), p.clone());
        }
        Ok(())
    }

    async fn list(&self, role_id: Uuid) -> Result<Vec<KeywordPattern>, AppError> {
        let mut list: Vec<KeywordPattern> = self
            .patterns
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.role_id == role_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.keyword.cmp(&b.keyword));
        Ok(list)
    }
}

#[async_trait]
impl ExperienceStore for MemoryStore {
    async fn skills(&self, role_id: Uuid) -> Result<Vec<Skill>, AppError> {
        Ok(self
            .skills
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.role_id == role_id)
            .cloned()
            .collect())
    }

    async fn accomplishments(&self, role_id: Uuid) -> Result<Vec<Accomplishment>, AppError> {
        Ok(self
            .accomplishments
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.role_id == role_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CallRecorder for MemoryStore {
    async fn record(&self, record: &CallRecord) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cross_role_read_is_an_ownership_mismatch() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let app = store.seed(owner, ApplicationStatus::Created).await;

        let err = store.get(Uuid::new_v4(), app.id).await.unwrap_err();
        assert!(matches!(err, AppError::OwnershipMismatch { .. }));

        let err = store.get(owner, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sparse_update_leaves_other_fields_alone() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let app = store.seed(owner, ApplicationStatus::Reviewed).await;

        let updated = store
            .update(
                owner,
                app.id,
                ApplicationUpdate::generation_status(GenerationStatus::GeneratingResume),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::Reviewed);
        assert_eq!(updated.generation_status, GenerationStatus::GeneratingResume);
        assert_eq!(updated.company_name.as_deref(), Some("Acme Robotics"));
        assert!(updated.updated_at >= app.updated_at);
    }
}
