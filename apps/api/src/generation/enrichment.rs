//! Enrichment analysis: suggests experience entries found in a generated resume.
//!
//! Best-effort: unparseable model output is a "no results" answer,
//! not an error. Suggestions are returned to the caller only, never persisted.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::generation::prompts::ENRICHMENT_PROMPT_TEMPLATE;
use crate::llm_client::parse_json;
use crate::llm_client::prompts::render_template;
use crate::models::experience::{Accomplishment, Skill};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Skill,
    Accomplishment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentSuggestion {
    pub kind: SuggestionKind,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Ok,
    NoResults,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentResponse {
    pub status: EnrichmentStatus,
    pub suggestions: Vec<EnrichmentSuggestion>,
}

impl EnrichmentResponse {
    pub fn no_results() -> Self {
        Self {
            status: EnrichmentStatus::NoResults,
            suggestions: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct SuggestionPayload {
    #[serde(default)]
    suggestions: Vec<EnrichmentSuggestion>,
}

pub fn enrichment_prompt(
    document: &str,
    skills: &[Skill],
    accomplishments: &[Accomplishment],
) -> String {
    let skills = bullet_list(skills.iter().map(|s| s.name.as_str()));
    let accomplishments = bullet_list(accomplishments.iter().map(|a| a.description.as_str()));
    render_template(
        ENRICHMENT_PROMPT_TEMPLATE,
        &[
            ("skills", skills.as_str()),
            ("accomplishments", accomplishments.as_str()),
            ("document", document),
        ],
    )
}

/// Parses model output, dropping blanks and anything already recorded.
pub fn parse_suggestions(
    text: &str,
    skills: &[Skill],
    accomplishments: &[Accomplishment],
) -> EnrichmentResponse {
    let payload: SuggestionPayload = match parse_json(text) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Enrichment output unparseable, returning no results: {e}");
            return EnrichmentResponse::no_results();
        }
    };

    let known_skills: HashSet<String> = skills.iter().map(|s| normalize(&s.name)).collect();
    let known_accomplishments: HashSet<String> = accomplishments
        .iter()
        .map(|a| normalize(&a.description))
        .collect();
    let mut seen = HashSet::new();

    let suggestions: Vec<EnrichmentSuggestion> = payload
        .suggestions
        .into_iter()
        .filter(|s| {
            let key = normalize(&s.text);
            if key.is_empty() || !seen.insert((s.kind, key.clone())) {
                return false;
            }
            match s.kind {
                SuggestionKind::Skill => !known_skills.contains(&key),
                SuggestionKind::Accomplishment => !known_accomplishments.contains(&key),
            }
        })
        .collect();

    if suggestions.is_empty() {
        return EnrichmentResponse::no_results();
    }
    EnrichmentResponse {
        status: EnrichmentStatus::Ok,
        suggestions,
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<String> = items.map(|item| format!("- {item}")).collect();
    if lines.is_empty() {
        "- (none)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn skill(name: &str) -> Skill {
        Skill {
            id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            name: name.to_string(),
            category: None,
        }
    }

    #[test]
    fn test_unparseable_output_is_no_results() {
        let response = parse_suggestions("I found a few things!", &[], &[]);
        assert_eq!(response.status, EnrichmentStatus::NoResults);
        assert!(response.suggestions.is_empty());
    }

    #[test]
    fn test_known_and_duplicate_suggestions_are_dropped() {
        let text = r#"{"suggestions": [
            {"kind": "skill", "text": "Rust"},
            {"kind": "skill", "text": "Kubernetes", "evidence": "Ran Kubernetes"},
            {"kind": "skill", "text": "kubernetes "},
            {"kind": "accomplishment", "text": "Cut CI time by 30%"}
        ]}"#;
        let response = parse_suggestions(text, &[skill("rust")], &[]);
        assert_eq!(response.status, EnrichmentStatus::Ok);
        let texts: Vec<&str> = response.suggestions.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Kubernetes", "Cut CI time by 30%"]);
    }

    #[test]
    fn test_nothing_new_is_no_results() {
        let response = parse_suggestions(r#"{"suggestions": []}"#, &[], &[]);
        assert_eq!(response.status, EnrichmentStatus::NoResults);
    }
}
