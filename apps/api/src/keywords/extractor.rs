use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::keywords::prompts::KEYWORD_EXTRACTION_TEMPLATE;
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{parse_json, CallTrace, LlmGateway, LlmRequest};
use crate::models::keyword::Keyword;

/// Accepts both `{"keywords": [...]}` and a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeywordPayload {
    Wrapped { keywords: Vec<Keyword> },
    Bare(Vec<Keyword>),
}

/// Extracts ranked keywords from a job posting.
///
/// Empty or unparseable model output is a hard failure, never an empty list:
/// downstream ranking and learning both depend on a real keyword set.
pub async fn extract_keywords(
    gateway: &dyn LlmGateway,
    job_posting: &str,
    trace: CallTrace,
) -> Result<Vec<Keyword>, AppError> {
    if job_posting.trim().is_empty() {
        return Err(AppError::Validation(
            "job_posting cannot be empty".to_string(),
        ));
    }

    let prompt = KEYWORD_EXTRACTION_TEMPLATE.replace("{job_posting}", job_posting);
    let mut request = LlmRequest::new("keyword_extraction", JSON_ONLY_SYSTEM, prompt);
    request.trace = trace;

    let completion = gateway
        .generate(&request)
        .await
        .map_err(|e| AppError::from_llm("Keyword extraction", e))?;

    let keywords = parse_keywords(&completion.text)?;
    info!("Extracted {} keywords", keywords.len());
    Ok(keywords)
}

/// Parses, clamps priorities into 1..=10 and sorts by descending priority.
pub fn parse_keywords(text: &str) -> Result<Vec<Keyword>, AppError> {
    let payload: KeywordPayload = parse_json(text).map_err(|e| {
        warn!("Keyword extraction output unparseable: {e}");
        AppError::Extraction("model returned no parseable keyword list".to_string())
    })?;

    let mut keywords = match payload {
        KeywordPayload::Wrapped { keywords } | KeywordPayload::Bare(keywords) => keywords,
    };
    keywords.retain(|k| !k.text.trim().is_empty());
    if keywords.is_empty() {
        return Err(AppError::Extraction(
            "model returned an empty keyword list".to_string(),
        ));
    }

    for keyword in &mut keywords {
        keyword.priority = keyword.priority.clamp(1, 10);
        keyword.text = keyword.text.trim().to_string();
    }
    // Stable sort keeps the model's order among equal priorities.
    keywords.sort_by(|a, b| b.priority.cmp(&a.priority));
    Ok(keywords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::LlmError;
    use crate::models::keyword::KeywordCategory;
    use crate::testing::MockGateway;

    #[test]
    fn test_parse_sorts_by_descending_priority() {
        let text = r#"```json
        {"keywords": [
            {"text": "Docker", "priority": 4, "category": "tool"},
            {"text": "Rust", "priority": 9, "category": "technical_skill"},
            {"text": "Mentoring", "priority": 6, "category": "soft_skill"}
        ]}
        ```"#;
        let keywords = parse_keywords(text).unwrap();
        let priorities: Vec<u8> = keywords.iter().map(|k| k.priority).collect();
        assert_eq!(priorities, vec![9, 6, 4]);
        assert_eq!(keywords[0].category, KeywordCategory::TechnicalSkill);
    }

    #[test]
    fn test_parse_accepts_bare_array_and_clamps_priority() {
        let text = r#"[{"text": " SQL ", "priority": 14, "category": "made_up"}]"#;
        let keywords = parse_keywords(text).unwrap();
        assert_eq!(keywords[0].text, "SQL");
        assert_eq!(keywords[0].priority, 10);
        assert_eq!(keywords[0].category, KeywordCategory::Other);
    }

    #[test]
    fn test_parse_rejects_garbage_and_empty_lists() {
        assert!(matches!(
            parse_keywords("Here are some keywords!"),
            Err(AppError::Extraction(_))
        ));
        assert!(matches!(
            parse_keywords(""),
            Err(AppError::Extraction(_))
        ));
        assert!(matches!(
            parse_keywords(r#"{"keywords": []}"#),
            Err(AppError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_surfaces_empty_output_as_failure() {
        let mock = MockGateway::new();
        mock.push_text("");
        let err = extract_keywords(&mock, "Rust engineer", CallTrace::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_extract_maps_gateway_errors() {
        let mock = MockGateway::new();
        mock.push_error(LlmError::CircuitOpen);
        let err = extract_keywords(&mock, "Rust engineer", CallTrace::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CircuitOpen));
    }
}
