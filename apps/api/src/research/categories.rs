use crate::models::research::CategoryResult;

/// One research category, run as its own gateway call.
#[derive(Debug, Clone, Copy)]
pub struct ResearchCategory {
    pub id: &'static str,
    pub label: &'static str,
    /// What the model should look for.
    pub focus: &'static str,
    /// Shortest answer that still counts as content for this category.
    pub min_chars: usize,
}

/// Fixed run order.
pub const CATEGORIES: &[ResearchCategory] = &[
    ResearchCategory {
        id: "company_overview",
        label: "Company Overview",
        focus: "what the company does, its products, customers, size and stage",
        min_chars: 80,
    },
    ResearchCategory {
        id: "culture_values",
        label: "Culture & Values",
        focus: "stated values, working style, team structure and how employees describe the culture",
        min_chars: 60,
    },
    ResearchCategory {
        id: "recent_news",
        label: "Recent News",
        focus: "funding, launches, acquisitions, leadership changes or press from the last 12 months",
        min_chars: 40,
    },
    ResearchCategory {
        id: "tech_stack",
        label: "Tech Stack",
        focus: "languages, frameworks, infrastructure and engineering practices the team uses",
        min_chars: 20,
    },
    ResearchCategory {
        id: "role_context",
        label: "Role Context",
        focus: "why this role exists, the team it sits in and what success in it looks like",
        min_chars: 60,
    },
];

pub fn label_for(id: &str) -> &str {
    CATEGORIES
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.label)
        .unwrap_or(id)
}

const NOT_FOUND_MARKER: &str = "NOT_FOUND:";
const PARTIAL_MARKER: &str = "PARTIAL:";

const NOT_FOUND_PHRASES: &[&str] = &[
    "no information found",
    "could not find",
    "couldn't find",
    "unable to find",
    "no reliable information",
    "no publicly available information",
    "not enough information",
];

/// Classifies a category answer as found, partial or not found.
///
/// Answers follow a small protocol (`NOT_FOUND: <reason>`, or `PARTIAL: <note>`
/// on the first line) but models drift, so explicit not-found phrasing in a
/// short answer and answers below the category's minimum length also count as misses.
pub fn classify(category: &ResearchCategory, raw: &str) -> CategoryResult {
    let text = raw.trim();
    if text.is_empty() {
        return CategoryResult::not_found("No content returned");
    }

    if let Some(reason) = strip_marker(text, NOT_FOUND_MARKER) {
        let reason = reason.trim();
        return CategoryResult::not_found(if reason.is_empty() {
            "No information found"
        } else {
            reason
        });
    }

    let lowered = text.to_lowercase();
    if text.chars().count() < category.min_chars * 3
        && NOT_FOUND_PHRASES.iter().any(|p| lowered.contains(p))
    {
        return CategoryResult::not_found(text.to_string());
    }

    if let Some(rest) = strip_marker(text, PARTIAL_MARKER) {
        let (note, content) = match rest.split_once('\n') {
            Some((note, content)) => (note.trim(), content.trim()),
            None => ("Limited information available", rest.trim()),
        };
        if content.chars().count() < category.min_chars {
            return CategoryResult::not_found(format!("Too little content: {note}"));
        }
        return CategoryResult::partial(content.to_string(), note.to_string());
    }

    if text.chars().count() < category.min_chars {
        return CategoryResult::not_found("Answer too short to be useful");
    }

    CategoryResult::found(text.to_string())
}

fn strip_marker<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let head = text.get(..marker.len())?;
    head.eq_ignore_ascii_case(marker)
        .then(|| &text[marker.len()..])
}
