use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::keyword::Keyword;
use crate::models::research::ResearchResult;

/// Lifecycle status of an application. Only ever moves forward; see `lifecycle::transitions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Created,
    Keywords,
    Researching,
    Reviewed,
    Generating,
    Exported,
    Sent,
    Callback,
    Offer,
    Closed,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 10] = [
        ApplicationStatus::Created,
        ApplicationStatus::Keywords,
        ApplicationStatus::Researching,
        ApplicationStatus::Reviewed,
        ApplicationStatus::Generating,
        ApplicationStatus::Exported,
        ApplicationStatus::Sent,
        ApplicationStatus::Callback,
        ApplicationStatus::Offer,
        ApplicationStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Created => "created",
            ApplicationStatus::Keywords => "keywords",
            ApplicationStatus::Researching => "researching",
            ApplicationStatus::Reviewed => "reviewed",
            ApplicationStatus::Generating => "generating",
            ApplicationStatus::Exported => "exported",
            ApplicationStatus::Sent => "sent",
            ApplicationStatus::Callback => "callback",
            ApplicationStatus::Offer => "offer",
            ApplicationStatus::Closed => "closed",
        }
    }

    /// Position in the forward ordering of the lifecycle.
    pub fn rank(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown application status '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    GeneratingResume,
    GeneratingCoverLetter,
    Complete,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Idle => "idle",
            GenerationStatus::GeneratingResume => "generating_resume",
            GenerationStatus::GeneratingCoverLetter => "generating_cover_letter",
            GenerationStatus::Complete => "complete",
            GenerationStatus::Failed => "failed",
        }
    }
}

impl FromStr for GenerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(GenerationStatus::Idle),
            "generating_resume" => Ok(GenerationStatus::GeneratingResume),
            "generating_cover_letter" => Ok(GenerationStatus::GeneratingCoverLetter),
            "complete" => Ok(GenerationStatus::Complete),
            "failed" => Ok(GenerationStatus::Failed),
            other => Err(format!("unknown generation status '{other}'")),
        }
    }
}

/// Raw `applications` row as stored in PostgreSQL.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub role_id: Uuid,
    pub company_name: Option<String>,
    pub job_posting: Option<String>,
    pub job_url: Option<String>,
    pub status: String,
    pub keywords: Option<Value>,
    pub research_data: Option<Value>,
    pub manual_context: Option<String>,
    pub generation_status: String,
    pub generated_resume: Option<String>,
    pub generated_cover_letter: Option<String>,
    pub cover_letter_tone: Option<String>,
    pub resume_violations_fixed: i32,
    pub resume_constraint_warnings: Option<Value>,
    pub cover_letter_violations_fixed: i32,
    pub cover_letter_constraint_warnings: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The central aggregate: one job application owned by one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub role_id: Uuid,
    pub company_name: Option<String>,
    pub job_posting: Option<String>,
    pub job_url: Option<String>,
    pub status: ApplicationStatus,
    /// Serialized `Vec<Keyword>`.
    pub keywords: Option<Value>,
    /// Serialized `ResearchResult`.
    pub research_data: Option<Value>,
    /// HTML-escaped; written only through `ApplicationStore::set_manual_context`.
    pub manual_context: Option<String>,
    pub generation_status: GenerationStatus,
    pub generated_resume: Option<String>,
    pub generated_cover_letter: Option<String>,
    pub cover_letter_tone: Option<String>,
    pub resume_violations_fixed: i32,
    pub resume_constraint_warnings: Option<Value>,
    pub cover_letter_violations_fixed: i32,
    pub cover_letter_constraint_warnings: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = anyhow::Error;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: row.id,
            role_id: row.role_id,
            company_name: row.company_name,
            job_posting: row.job_posting,
            job_url: row.job_url,
            status: row.status.parse().map_err(anyhow::Error::msg)?,
            keywords: row.keywords,
            research_data: row.research_data,
            manual_context: row.manual_context,
            generation_status: row.generation_status.parse().map_err(anyhow::Error::msg)?,
            generated_resume: row.generated_resume,
            generated_cover_letter: row.generated_cover_letter,
            cover_letter_tone: row.cover_letter_tone,
            resume_violations_fixed: row.resume_violations_fixed,
            resume_constraint_warnings: row.resume_constraint_warnings,
            cover_letter_violations_fixed: row.cover_letter_violations_fixed,
            cover_letter_constraint_warnings: row.cover_letter_constraint_warnings,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Application {
    /// Parses the stored keyword list. Malformed JSON yields an empty list.
    pub fn parsed_keywords(&self) -> Vec<Keyword> {
        self.keywords
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Parses the stored research result, if any.
    pub fn research(&self) -> Option<ResearchResult> {
        self.research_data
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Input for creating a new application.
#[derive(Debug, Clone, Deserialize)]
pub struct NewApplication {
    pub company_name: Option<String>,
    pub job_posting: Option<String>,
    pub job_url: Option<String>,
}

/// Sparse partial update. Only `Some` fields are written; `updated_at` is always bumped.
/// Manual context is deliberately absent: it has its own sanitizing write path.
#[derive(Debug, Clone, Default)]
pub struct ApplicationUpdate {
    pub status: Option<ApplicationStatus>,
    pub keywords: Option<Value>,
    pub research_data: Option<Value>,
    pub generation_status: Option<GenerationStatus>,
    pub generated_resume: Option<String>,
    pub resume_violations_fixed: Option<i32>,
    pub resume_constraint_warnings: Option<Value>,
    pub generated_cover_letter: Option<String>,
    pub cover_letter_tone: Option<String>,
    pub cover_letter_violations_fixed: Option<i32>,
    pub cover_letter_constraint_warnings: Option<Value>,
}

impl ApplicationUpdate {
    pub fn status(status: ApplicationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn generation_status(status: GenerationStatus) -> Self {
        Self {
            generation_status: Some(status),
            ..Default::default()
        }
    }

    /// Applies the provided fields to an in-memory record.
    pub fn apply_to(self, app: &mut Application) {
        if let Some(v) = self.status {
            app.status = v;
        }
        if let Some(v) = self.keywords {
            app.keywords = Some(v);
        }
        if let Some(v) = self.research_data {
            app.research_data = Some(v);
        }
        if let Some(v) = self.generation_status {
            app.generation_status = v;
        }
        if let Some(v) = self.generated_resume {
            app.generated_resume = Some(v);
        }
        if let Some(v) = self.resume_violations_fixed {
            app.resume_violations_fixed = v;
        }
        if let Some(v) = self.resume_constraint_warnings {
            app.resume_constraint_warnings = Some(v);
        }
        if let Some(v) = self.generated_cover_letter {
            app.generated_cover_letter = Some(v);
        }
        if let Some(v) = self.cover_letter_tone {
            app.cover_letter_tone = Some(v);
        }
        if let Some(v) = self.cover_letter_violations_fixed {
            app.cover_letter_violations_fixed = v;
        }
        if let Some(v) = self.cover_letter_constraint_warnings {
            app.cover_letter_constraint_warnings = Some(v);
        }
        app.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ApplicationStatus::ALL {
            assert_eq!(status.as_str().parse::<ApplicationStatus>(), Ok(status));
        }
        assert!("archived".parse::<ApplicationStatus>().is_err());
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        let json = serde_json::to_string(&ApplicationStatus::Callback).unwrap();
        assert_eq!(json, "\"callback\"");
        let status: GenerationStatus = serde_json::from_str("\"generating_cover_letter\"").unwrap();
        assert_eq!(status, GenerationStatus::GeneratingCoverLetter);
    }

    #[test]
    fn test_rank_is_monotonic_along_the_happy_path() {
        assert!(ApplicationStatus::Created.rank() < ApplicationStatus::Keywords.rank());
        assert!(ApplicationStatus::Reviewed.rank() < ApplicationStatus::Generating.rank());
        assert!(ApplicationStatus::Offer.rank() < ApplicationStatus::Closed.rank());
    }

    #[test]
    fn test_malformed_keyword_json_parses_as_empty() {
        let now = Utc::now();
        let app = Application {
            id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            company_name: None,
            job_posting: None,
            job_url: None,
            status: ApplicationStatus::Created,
            keywords: Some(serde_json::json!({"not": "a list"})),
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
        assert!(app.parsed_keywords().is_empty());
        assert!(app.research().is_none());
    }
}
