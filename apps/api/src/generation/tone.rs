//! Cover letter tone: a fixed set, with a lenient parse.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverLetterTone {
    #[default]
    Formal,
    Conversational,
    MatchCulture,
}

impl CoverLetterTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverLetterTone::Formal => "formal",
            CoverLetterTone::Conversational => "conversational",
            CoverLetterTone::MatchCulture => "match_culture",
        }
    }

    /// Unknown or missing values fall back to `Formal` rather than erroring.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("formal") | None => CoverLetterTone::Formal,
            Some("conversational") => CoverLetterTone::Conversational,
            Some("match_culture") => CoverLetterTone::MatchCulture,
            Some(other) => {
                debug!("Unknown cover letter tone '{other}', using formal");
                CoverLetterTone::Formal
            }
        }
    }

    /// Tone guidance appended to the cover letter prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            CoverLetterTone::Formal => {
                "TONE: Formal and professional. Complete sentences, no contractions, \
                 no exclamation marks."
            }
            CoverLetterTone::Conversational => {
                "TONE: Warm and conversational, as if writing to a future teammate. \
                 Contractions are fine; stay specific and concise."
            }
            CoverLetterTone::MatchCulture => {
                "TONE: Mirror the company's own voice as shown in the Culture & Values \
                 research and the job posting. If the culture research is unavailable, \
                 fall back to a professional tone."
            }
        }
    }
}
