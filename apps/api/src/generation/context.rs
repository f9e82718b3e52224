//! Prompt context assembly for document generation.
//!
//! Research rendering rules:
//! - only `found` categories are rendered, each under its own heading
//! - partial categories get a "(may be incomplete)" marker
//! - gaps become a note telling the model to proceed without them

use std::fmt::Write;

use crate::models::application::Application;
use crate::models::experience::{Accomplishment, Skill};
use crate::models::keyword::Keyword;
use crate::models::research::ResearchResult;
use crate::research::categories::{label_for, CATEGORIES};

pub const NO_MANUAL_CONTEXT: &str = "No additional context provided.";
pub const NO_RESEARCH: &str = "No company research available.";
pub const NO_KEYWORDS: &str = "No keywords extracted.";

/// Everything the generation prompts interpolate, already rendered to text.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub company_name: String,
    pub job_posting: String,
    pub experience: String,
    pub keywords: String,
    pub research: String,
    pub gap_note: Option<String>,
    pub manual_context: String,
}

impl PromptContext {
    pub fn build(
        application: &Application,
        skills: &[Skill],
        accomplishments: &[Accomplishment],
    ) -> Self {
        let research = application.research();
        Self {
            company_name: application
                .company_name
                .clone()
                .unwrap_or_else(|| "the company".to_string()),
            job_posting: application.job_posting.clone().unwrap_or_default(),
            experience: format_experience(skills, accomplishments),
            keywords: format_keywords(&application.parsed_keywords()),
            research: research
                .as_ref()
                .map(format_research)
                .unwrap_or_else(|| NO_RESEARCH.to_string()),
            gap_note: research.as_ref().and_then(gap_note),
            manual_context: application
                .manual_context
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| NO_MANUAL_CONTEXT.to_string()),
        }
    }

    /// Research section plus the gap note, if any.
    pub fn research_block(&self) -> String {
        match &self.gap_note {
            Some(note) => format!("{}\n\n{}", self.research, note),
            None => self.research.clone(),
        }
    }
}

pub fn format_experience(skills: &[Skill], accomplishments: &[Accomplishment]) -> String {
    let mut out = String::from("SKILLS:\n");
    if skills.is_empty() {
        out.push_str("- (none recorded)\n");
    }
    for skill in skills {
        match &skill.category {
            Some(category) => {
                let _ = writeln!(out, "- {} ({category})", skill.name);
            }
            None => {
                let _ = writeln!(out, "- {}", skill.name);
            }
        }
    }

    out.push_str("\nACCOMPLISHMENTS:\n");
    if accomplishments.is_empty() {
        out.push_str("- (none recorded)\n");
    }
    for accomplishment in accomplishments {
        match &accomplishment.context {
            Some(context) => {
                let _ = writeln!(out, "- {} [{context}]", accomplishment.description);
            }
            None => {
                let _ = writeln!(out, "- {}", accomplishment.description);
            }
        }
    }
    out.trim_end().to_string()
}

/// Numbered list, highest priority first.
pub fn format_keywords(keywords: &[Keyword]) -> String {
    if keywords.is_empty() {
        return NO_KEYWORDS.to_string();
    }
    let mut sorted: Vec<&Keyword> = keywords.iter().collect();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
    sorted
        .iter()
        .enumerate()
        .map(|(i, k)| format!("{}. {} (priority {}/10)", i + 1, k.text, k.priority))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_research(research: &ResearchResult) -> String {
    let mut sections = Vec::new();
    // Category run order, then anything unexpected that was persisted.
    let ordered = CATEGORIES
        .iter()
        .map(|c| c.id)
        .chain(
            research
                .categories
                .keys()
                .map(String::as_str)
                .filter(|id| CATEGORIES.iter().all(|c| c.id != *id)),
        );

    for id in ordered {
        let Some(result) = research.categories.get(id) else {
            continue;
        };
        if !result.found {
            continue;
        }
        let Some(content) = result.content.as_deref() else {
            continue;
        };
        let marker = if result.partial { " (may be incomplete)" } else { "" };
        sections.push(format!("## {}{marker}\n{}", label_for(id), content.trim()));
    }

    if sections.is_empty() {
        NO_RESEARCH.to_string()
    } else {
        sections.join("\n\n")
    }
}

pub fn gap_note(research: &ResearchResult) -> Option<String> {
    if !research.has_gaps() {
        return None;
    }
    let labels: Vec<&str> = research.gaps.iter().map(|g| label_for(g)).collect();
    Some(format!(
        "NOTE: Research was unavailable for: {}. Proceed without this information \
         and do not invent details about these areas.",
        labels.join(", ")
    ))
}
