use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of researching one category for one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Why nothing usable came back. Only set when `found` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_note: Option<String>,
}

impl CategoryResult {
    pub fn found(content: String) -> Self {
        Self {
            found: true,
            content: Some(content),
            reason: None,
            partial: false,
            partial_note: None,
        }
    }

    pub fn partial(content: String, note: String) -> Self {
        Self {
            partial: true,
            partial_note: Some(note),
            ..Self::found(content)
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            found: false,
            content: None,
            reason: Some(reason.into()),
            partial: false,
            partial_note: None,
        }
    }
}

/// Aggregated research run, persisted as JSON on the application.
///
/// Serializes as `{"<category>": {...}, ..., "gaps": [...], "completed_at": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    #[serde(flatten)]
    pub categories: BTreeMap<String, CategoryResult>,
    #[serde(default)]
    pub gaps: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl ResearchResult {
    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }
}
