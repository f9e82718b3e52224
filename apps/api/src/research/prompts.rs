// Prompt constants for company research.
// Reuses GROUNDING_INSTRUCTION from llm_client::prompts.

/// System prompt for a single research category call.
pub const RESEARCH_SYSTEM: &str = "You are a company research assistant helping a job \
    applicant prepare a tailored application. Report only facts you can support. \
    Write plain prose in short paragraphs, no markdown headings.";

/// Category prompt template. Replace `{company}`, `{label}`, `{focus}`,
/// `{source_hint}` and `{job_posting}` before sending.
pub const CATEGORY_PROMPT_TEMPLATE: &str = r#"Research {company} for the category "{label}".

Focus on: {focus}

{source_hint}

ANSWER FORMAT:
- If you cannot find reliable information, reply with exactly one line: NOT_FOUND: <short reason>
- If you found only limited information, start with one line: PARTIAL: <what is missing>
  and put your findings on the following lines.
- Otherwise reply with your findings only.

JOB POSTING (for context):
{job_posting}"#;

pub const SOURCE_HINT_WITH_URL: &str =
    "You may use the fetch_page tool to read web pages. The job posting is at {job_url}; \
    start there and follow links to the company's own site.";

pub const SOURCE_HINT_WITH_TOOL: &str =
    "You may use the fetch_page tool to read web pages such as the company's website.";

pub const SOURCE_HINT_NO_TOOL: &str =
    "Use what you already know about the company and the job posting itself.";
