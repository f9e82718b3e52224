// Prompt constants for keyword extraction.
// Reuses the JSON-only fragment from llm_client::prompts.

/// Extraction prompt template. Replace `{job_posting}` before sending.
pub const KEYWORD_EXTRACTION_TEMPLATE: &str = r#"Extract the keywords an applicant tracking system and a hiring manager would look for in the job posting below.

Return a JSON object with this EXACT schema (no extra fields):
{
  "keywords": [
    {"text": "Rust", "priority": 9, "category": "technical_skill"}
  ]
}

Rules:
- Return between 15 and 20 keywords.
- "priority" is an integer from 1 (nice to have) to 10 (hard requirement).
- "category" MUST be one of: "technical_skill", "soft_skill", "tool", "domain_knowledge", "certification", "experience".
- Use the wording of the posting; do not paraphrase a keyword into a synonym.
- Do not repeat a keyword.

JOB POSTING:
{job_posting}"#;
