use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{
    Application, ApplicationRow, ApplicationStatus, ApplicationUpdate, GenerationStatus,
    NewApplication,
};
use crate::models::call_record::CallRecord;
use crate::models::experience::{Accomplishment, Skill};
use crate::models::keyword::KeywordPattern;
use crate::store::{
    status_conflict, ApplicationStore, CallRecorder, ExperienceStore, KeywordPatternStore,
    SanitizedContext,
};

/// PostgreSQL-backed implementation of every storage trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Classifies a scoped miss: unknown id vs. row owned by another role.
    async fn miss(&self, role_id: Uuid, id: Uuid) -> AppError {
        let owner: Result<Option<Uuid>, sqlx::Error> =
            sqlx::query_scalar("SELECT role_id FROM applications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;
        match owner {
            Ok(Some(_)) => AppError::OwnershipMismatch {
                entity: "Application",
                id,
                role_id,
            },
            Ok(None) => AppError::NotFound(format!("Application {id} not found")),
            Err(e) => AppError::Database(e),
        }
    }
}

fn into_application(row: ApplicationRow) -> Result<Application, AppError> {
    Application::try_from(row).map_err(AppError::Internal)
}

#[async_trait]
impl ApplicationStore for PgStore {
    async fn create(&self, role_id: Uuid, input: NewApplication) -> Result<Application, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            INSERT INTO applications
                (id, role_id, company_name, job_posting, job_url, status, generation_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(role_id)
        .bind(&input.company_name)
        .bind(&input.job_posting)
        .bind(&input.job_url)
        .bind(ApplicationStatus::Created.as_str())
        .bind(GenerationStatus::Idle.as_str())
        .fetch_one(&self.pool)
        .await?;
        into_application(row)
    }

    async fn get(&self, role_id: Uuid, id: Uuid) -> Result<Application, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE id = $1 AND role_id = $2",
        )
        .bind(id)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => into_application(row),
            None => Err(self.miss(role_id, id).await),
        }
    }

    async fn update(
        &self,
        role_id: Uuid,
        id: Uuid,
        update: ApplicationUpdate,
    ) -> Result<Application, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            UPDATE applications SET
                status = COALESCE($3, status),
                keywords = COALESCE($4, keywords),
                research_data = COALESCE($5, research_data),
                generation_status = COALESCE($6, generation_status),
                generated_resume = COALESCE($7, generated_resume),
                resume_violations_fixed = COALESCE($8, resume_violations_fixed),
                resume_constraint_warnings = COALESCE($9, resume_constraint_warnings),
                generated_cover_letter = COALESCE($10, generated_cover_letter),
                cover_letter_tone = COALESCE($11, cover_letter_tone),
                cover_letter_violations_fixed = COALESCE($12, cover_letter_violations_fixed),
                cover_letter_constraint_warnings = COALESCE($13, cover_letter_constraint_warnings),
                updated_at = NOW()
            WHERE id = $1 AND role_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(role_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.keywords)
        .bind(update.research_data)
        .bind(update.generation_status.map(|s| s.as_str()))
        .bind(update.generated_resume)
        .bind(update.resume_violations_fixed)
        .bind(update.resume_constraint_warnings)
        .bind(update.generated_cover_letter)
        .bind(update.cover_letter_tone)
        .bind(update.cover_letter_violations_fixed)
        .bind(update.cover_letter_constraint_warnings)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => into_application(row),
            None => Err(self.miss(role_id, id).await),
        }
    }

    async fn update_status(
        &self,
        role_id: Uuid,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<Application, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            UPDATE applications SET status = $4, updated_at = NOW()
            WHERE id = $1 AND role_id = $2 AND status = $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(role_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => into_application(row),
            None => {
                let current = self.get(role_id, id).await?;
                Err(status_conflict(from, current.status))
            }
        }
    }

    async fn set_manual_context(
        &self,
        role_id: Uuid,
        id: Uuid,
        context: SanitizedContext,
    ) -> Result<Application, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            UPDATE applications SET manual_context = $3, updated_at = NOW()
            WHERE id = $1 AND role_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(role_id)
        .bind(context.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => into_application(row),
            None => Err(self.miss(role_id, id).await),
        }
    }
}

#[async_trait]
impl KeywordPatternStore for PgStore {
    async fn fetch(
        &self,
        role_id: Uuid,
        keywords: &[String],
    ) -> Result<Vec<KeywordPattern>, AppError> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sqlx::query_as::<_, KeywordPattern>(
            "SELECT * FROM keyword_patterns WHERE role_id = $1 AND keyword = ANY($2)",
        )
        .bind(role_id)
        .bind(keywords)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn upsert_many(
        &self,
        role_id: Uuid,
        patterns: &[KeywordPattern],
    ) -> Result<(), AppError> {
        if patterns.is_empty() {
            return Ok(());
        }
        let keywords: Vec<&str> = patterns.iter().map(|p| p.keyword.as_str()).collect();
        let used: Vec<i32> = patterns.iter().map(|p| p.times_used).collect();
        let successful: Vec<i32> = patterns.iter().map(|p| p.times_successful).collect();
        let rates: Vec<f64> = patterns.iter().map(|p| p.success_rate).collect();

        sqlx::query(
            r#"
            INSERT INTO keyword_patterns
                (role_id, keyword, times_used, times_successful, success_rate, updated_at)
            SELECT $1, k, u, s, r, NOW()
            FROM UNNEST($2::text[], $3::int4[], $4::int4[], $5::float8[]) AS t(k, u, s, r)
            ON CONFLICT (role_id, keyword) DO UPDATE SET
                times_used = EXCLUDED.times_used,
                times_successful = EXCLUDED.times_successful,
                success_rate = EXCLUDED.success_rate,
                updated_at = NOW()
            "#,
        )
        .bind(role_id)
        .bind(&keywords)
        .bind(&used)
        .bind(&successful)
        .bind(&rates)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, role_id: Uuid) -> Result<Vec<KeywordPattern>, AppError> {
        Ok(sqlx::query_as::<_, KeywordPattern>(
            "SELECT * FROM keyword_patterns WHERE role_id = $1 ORDER BY keyword",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl ExperienceStore for PgStore {
    async fn skills(&self, role_id: Uuid) -> Result<Vec<Skill>, AppError> {
        Ok(sqlx::query_as::<_, Skill>(
            "SELECT id, role_id, name, category FROM skills WHERE role_id = $1 ORDER BY category, name",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn accomplishments(&self, role_id: Uuid) -> Result<Vec<Accomplishment>, AppError> {
        Ok(sqlx::query_as::<_, Accomplishment>(
            "SELECT id, role_id, description, context FROM accomplishments WHERE role_id = $1 ORDER BY created_at",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl CallRecorder for PgStore {
    async fn record(&self, record: &CallRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO llm_calls
                (id, created_at, provider, model, prompt_name, input_tokens, output_tokens,
                 latency_ms, status, error, role_id, application_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(record.created_at)
        .bind(&record.provider)
        .bind(&record.model)
        .bind(&record.prompt_name)
        .bind(record.input_tokens as i32)
        .bind(record.output_tokens as i32)
        .bind(record.latency_ms as i64)
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(record.role_id)
        .bind(record.application_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
