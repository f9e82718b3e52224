//! Learning feedback loop: per-role keyword usage and success statistics,
//! and the ranking boost derived from them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::application::Application;
use crate::models::keyword::{normalize_keyword, Keyword, KeywordPattern};
use crate::store::KeywordPatternStore;

/// A keyword with its ranking score. The base score is `priority / 10`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredKeyword {
    #[serde(flatten)]
    pub keyword: Keyword,
    pub score: f64,
}

impl ScoredKeyword {
    pub fn from_priority(keyword: Keyword) -> Self {
        let score = f64::from(keyword.priority) / 10.0;
        Self { keyword, score }
    }
}

/// Blends historical success into the score of every keyword that has a
/// pattern with a nonzero success rate, then re-sorts by final score.
pub fn apply_pattern_boost(
    keywords: Vec<ScoredKeyword>,
    patterns: &HashMap<String, f64>,
    boost_weight: f64,
) -> Vec<ScoredKeyword> {
    let mut boosted: Vec<ScoredKeyword> = keywords
        .into_iter()
        .map(|mut scored| {
            match patterns.get(&normalize_keyword(&scored.keyword.text)) {
                Some(&rate) if rate > 0.0 => {
                    scored.score = (1.0 - boost_weight) * scored.score + boost_weight * rate;
                    scored.keyword.pattern_boosted = true;
                }
                _ => scored.keyword.pattern_boosted = false,
            }
            scored
        })
        .collect();
    boosted.sort_by(|a, b| b.score.total_cmp(&a.score));
    boosted
}

pub struct KeywordLearning {
    patterns: Arc<dyn KeywordPatternStore>,
    min_confidence: i32,
}

impl KeywordLearning {
    pub fn new(patterns: Arc<dyn KeywordPatternStore>, min_confidence: i32) -> Self {
        Self {
            patterns,
            min_confidence,
        }
    }

    /// Increments `times_used` for each unique normalized keyword.
    /// One read of the existing rows, one batched write.
    pub async fn record_keyword_usage(
        &self,
        role_id: Uuid,
        keywords: &[String],
    ) -> Result<usize, AppError> {
        let unique = unique_normalized(keywords.iter().map(String::as_str));
        if unique.is_empty() {
            return Ok(0);
        }

        let mut existing = self.existing(role_id, &unique).await?;
        let updated: Vec<KeywordPattern> = unique
            .into_iter()
            .map(|keyword| {
                let mut pattern = existing
                    .remove(&keyword)
                    .unwrap_or_else(|| KeywordPattern::new(role_id, keyword));
                pattern.times_used += 1;
                pattern.recompute_rate();
                pattern
            })
            .collect();

        self.patterns.upsert_many(role_id, &updated).await?;
        debug!("Recorded usage of {} keywords for role {role_id}", updated.len());
        Ok(updated.len())
    }

    /// Normalized keyword -> success rate, for patterns seen often enough to trust.
    pub async fn get_keyword_patterns(
        &self,
        role_id: Uuid,
    ) -> Result<HashMap<String, f64>, AppError> {
        Ok(self
            .patterns
            .list(role_id)
            .await?
            .into_iter()
            .filter(|p| p.times_used >= self.min_confidence)
            .map(|p| (p.keyword, p.success_rate))
            .collect())
    }

    /// Credits a success to every keyword on the application that has a usage row.
    /// Keywords never marked as used are logged and skipped.
    pub async fn record_application_success(
        &self,
        application: &Application,
    ) -> Result<usize, AppError> {
        let keywords = application.parsed_keywords();
        let unique = unique_normalized(keywords.iter().map(|k| k.text.as_str()));
        if unique.is_empty() {
            return Ok(0);
        }

        let mut existing = self.existing(application.role_id, &unique).await?;
        let mut updated = Vec::with_capacity(existing.len());
        for keyword in unique {
            match existing.remove(&keyword) {
                Some(mut pattern) => {
                    pattern.times_successful += 1;
                    pattern.recompute_rate();
                    updated.push(pattern);
                }
                None => warn!(
                    application_id = %application.id,
                    "Keyword '{keyword}' has no usage record; success not recorded"
                ),
            }
        }

        self.patterns
            .upsert_many(application.role_id, &updated)
            .await?;
        info!(
            application_id = %application.id,
            "Recorded success for {} keywords",
            updated.len()
        );
        Ok(updated.len())
    }

    async fn existing(
        &self,
        role_id: Uuid,
        keywords: &[String],
    ) -> Result<HashMap<String, KeywordPattern>, AppError> {
        Ok(self
            .patterns
            .fetch(role_id, keywords)
            .await?
            .into_iter()
            .map(|p| (p.keyword.clone(), p))
            .collect())
    }
}

fn unique_normalized<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<String> {
    texts
        .map(normalize_keyword)
        .filter(|k| !k.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
