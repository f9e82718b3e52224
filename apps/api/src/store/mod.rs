//! Storage collaborators. Every read and write is scoped by the owning role id;
//! a row that exists under another role surfaces as `AppError::OwnershipMismatch`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::{Application, ApplicationStatus, ApplicationUpdate, NewApplication};
use crate::models::call_record::CallRecord;
use crate::models::experience::{Accomplishment, Skill};
use crate::models::keyword::KeywordPattern;

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

/// Manual context that has passed the size cap and been HTML-escaped.
/// The only way to build one is `SanitizedContext::new`, which makes
/// `ApplicationStore::set_manual_context` the single sanitizing write path.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedContext(String);

impl SanitizedContext {
    pub fn new(raw: &str, max_chars: usize) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if len > max_chars {
            return Err(AppError::Validation(format!(
                "manual_context is {len} characters; the limit is {max_chars}"
            )));
        }
        Ok(Self(escape_html(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn create(&self, role_id: Uuid, input: NewApplication) -> Result<Application, AppError>;

    async fn get(&self, role_id: Uuid, id: Uuid) -> Result<Application, AppError>;

    /// Applies only the provided fields and bumps `updated_at`.
    async fn update(
        &self,
        role_id: Uuid,
        id: Uuid,
        update: ApplicationUpdate,
    ) -> Result<Application, AppError>;

    /// Writes `to` only while the stored status is still `from`. A status that
    /// moved in the meantime fails with `AppError::Conflict`.
    async fn update_status(
        &self,
        role_id: Uuid,
        id: Uuid,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<Application, AppError>;

    async fn set_manual_context(
        &self,
        role_id: Uuid,
        id: Uuid,
        context: SanitizedContext,
    ) -> Result<Application, AppError>;
}

pub(crate) fn status_conflict(expected: ApplicationStatus, actual: ApplicationStatus) -> AppError {
    AppError::Conflict(format!(
        "Application status changed concurrently: expected '{expected}', found '{actual}'"
    ))
}

#[async_trait]
pub trait KeywordPatternStore: Send + Sync {
    /// Existing patterns for the given normalized keywords, in one read.
    async fn fetch(&self, role_id: Uuid, keywords: &[String])
        -> Result<Vec<KeywordPattern>, AppError>;

    /// Inserts or overwrites the given patterns, in one write.
    async fn upsert_many(&self, role_id: Uuid, patterns: &[KeywordPattern])
        -> Result<(), AppError>;

    async fn list(&self, role_id: Uuid) -> Result<Vec<KeywordPattern>, AppError>;
}

/// Read-only view of a role's career experience.
#[async_trait]
pub trait ExperienceStore: Send + Sync {
    async fn skills(&self, role_id: Uuid) -> Result<Vec<Skill>, AppError>;

    async fn accomplishments(&self, role_id: Uuid) -> Result<Vec<Accomplishment>, AppError>;
}

#[async_trait]
pub trait CallRecorder: Send + Sync {
    async fn record(&self, record: &CallRecord) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_context_escapes_html() {
        let ctx = SanitizedContext::new("  <b>Met Jane</b> & \"Bob\"  ", 100).unwrap();
        assert_eq!(
            ctx.as_str(),
            "&lt;b&gt;Met Jane&lt;/b&gt; &amp; &quot;Bob&quot;"
        );
    }

    #[test]
    fn test_sanitized_context_rejects_oversized_input() {
        let raw = "x".repeat(11);
        let err = SanitizedContext::new(&raw, 10).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("limit is 10")));
    }

    #[test]
    fn test_size_cap_counts_characters_not_bytes() {
        let raw = "é".repeat(10);
        assert!(SanitizedContext::new(&raw, 10).is_ok());
    }
}
