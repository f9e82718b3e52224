// All LLM prompt constants for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for resume generation. STYLE and GROUNDING fragments are appended.
pub const RESUME_SYSTEM: &str = "You are an expert resume writer. \
    You write concise, achievement-focused resumes tailored to one job posting. \
    Output the resume as plain text with simple section headings and '-' bullets.";

/// System prompt for cover letter generation. STYLE and GROUNDING fragments are appended.
pub const COVER_LETTER_SYSTEM: &str = "You are an expert cover letter writer. \
    You write short, specific cover letters (three to five paragraphs) that connect \
    the candidate's real experience to the company's needs. \
    Output plain text only, starting with the salutation.";

/// Resume prompt template. Replace `{company}`, `{job_posting}`, `{keywords}`,
/// `{experience}`, `{research}` and `{manual_context}` before sending.
pub const RESUME_PROMPT_TEMPLATE: &str = r#"Write a tailored resume for the role at {company}.

JOB POSTING:
{job_posting}

PRIORITY KEYWORDS (work the highest-priority ones in naturally where the experience supports them):
{keywords}

CANDIDATE EXPERIENCE:
{experience}

COMPANY RESEARCH:
{research}

ADDITIONAL NOTES FROM THE CANDIDATE:
{manual_context}"#;

/// Cover letter prompt template. Same placeholders as the resume template plus `{tone}`.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a cover letter for the role at {company}.

{tone}

JOB POSTING:
{job_posting}

PRIORITY KEYWORDS:
{keywords}

CANDIDATE EXPERIENCE:
{experience}

COMPANY RESEARCH:
{research}

ADDITIONAL NOTES FROM THE CANDIDATE:
{manual_context}"#;

/// Enrichment prompt template. Replace `{document}`, `{skills}` and `{accomplishments}`.
pub const ENRICHMENT_PROMPT_TEMPLATE: &str = r#"Compare the generated resume below with the candidate's recorded experience.
Find skills and accomplishments that the resume states but the recorded experience does not list yet.

Return a JSON object with this EXACT schema (no extra fields):
{
  "suggestions": [
    {"kind": "skill", "text": "Kubernetes", "category": "infrastructure", "evidence": "Deployed services on Kubernetes"},
    {"kind": "accomplishment", "text": "Reduced build times by 30%", "category": null, "evidence": "Cut CI build times by 30%"}
  ]
}

Rules:
- "kind" is "skill" or "accomplishment".
- Only include items with direct evidence in the resume text; quote it in "evidence".
- Do not repeat anything already in the recorded lists.
- Return {"suggestions": []} when there is nothing new.

RECORDED SKILLS:
{skills}

RECORDED ACCOMPLISHMENTS:
{accomplishments}

GENERATED RESUME:
{document}"#;
