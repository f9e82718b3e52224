use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Category a job-posting keyword is classified into by the extraction prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCategory {
    TechnicalSkill,
    SoftSkill,
    Tool,
    DomainKnowledge,
    Certification,
    Experience,
    #[serde(other)]
    Other,
}

/// A single extracted keyword as persisted on the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    /// 1 (nice to have) – 10 (must have)
    pub priority: u8,
    pub category: KeywordCategory,
    #[serde(default)]
    pub pattern_boosted: bool,
}

/// Per-role historical usage and success statistics for one normalized keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct KeywordPattern {
    pub role_id: Uuid,
    pub keyword: String,
    pub times_used: i32,
    pub times_successful: i32,
    pub success_rate: f64,
    pub updated_at: DateTime<Utc>,
}

impl KeywordPattern {
    pub fn new(role_id: Uuid, keyword: String) -> Self {
        Self {
            role_id,
            keyword,
            times_used: 0,
            times_successful: 0,
            success_rate: 0.0,
            updated_at: Utc::now(),
        }
    }

    /// `times_successful / times_used`, clamped to [0, 1].
    pub fn recompute_rate(&mut self) {
        self.success_rate = if self.times_used > 0 {
            (self.times_successful as f64 / self.times_used as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.updated_at = Utc::now();
    }
}

/// Normalized form used as the pattern key.
pub fn normalize_keyword(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize_keyword("  Python "), "python");
        assert_eq!(normalize_keyword("CI/CD"), "ci/cd");
    }

    #[test]
    fn test_success_rate_is_clamped() {
        let mut p = KeywordPattern::new(Uuid::new_v4(), "rust".to_string());
        p.times_used = 2;
        p.times_successful = 5;
        p.recompute_rate();
        assert!((p.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_category_falls_back_to_other() {
        let kw: Keyword = serde_json::from_str(
            r#"{"text": "Kafka", "priority": 7, "category": "streaming_platform"}"#,
        )
        .unwrap();
        assert_eq!(kw.category, KeywordCategory::Other);
        assert!(!kw.pattern_boosted);
    }
}
