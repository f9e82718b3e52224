use lazy_static::lazy_static;
use regex::Regex;

use crate::constraints::cliches::{suggestion_for, CLICHES};
use crate::constraints::{ConstraintConfig, ConstraintResult, Severity, Violation, ViolationKind};

/// Characters that break ATS parsers or read as machine-generated, with their ASCII form.
const PROBLEMATIC_CHARS: &[(char, &str, &str)] = &[
    ('\u{2014}', "-", "em dash"),
    ('\u{2013}', "-", "en dash"),
    ('\u{201C}', "\"", "left double quote"),
    ('\u{201D}', "\"", "right double quote"),
    ('\u{2018}', "'", "left single quote"),
    ('\u{2019}', "'", "right single quote"),
    ('\u{2026}', "...", "ellipsis character"),
    ('\u{2022}', "-", "bullet glyph"),
];

lazy_static! {
    static ref EXCESS_NEWLINES: Regex = Regex::new(r"\n{3,}").expect("valid regex");
    static ref EXCESS_SPACES: Regex = Regex::new(r" {2,}").expect("valid regex");
}

pub fn enforce_constraints(text: &str) -> ConstraintResult {
    enforce_constraints_with(text, &ConstraintConfig::default())
}

pub fn enforce_constraints_with(text: &str, config: &ConstraintConfig) -> ConstraintResult {
    if text.trim().is_empty() {
        return ConstraintResult::empty(text);
    }

    let (char_violations, replaced) = repair_characters(text);
    let violations_fixed = char_violations.len();

    let mut flagged = find_cliches(&replaced);
    flagged.extend(find_ats_issues(&replaced, config.max_line_length));
    let violations_remaining = flagged.len();

    let mut violations = char_violations;
    violations.extend(flagged);

    ConstraintResult {
        text: normalize_whitespace(&replaced),
        violations,
        violations_fixed,
        violations_remaining,
    }
}

/// Counts every problematic character first, then replaces in one pass.
fn repair_characters(text: &str) -> (Vec<Violation>, String) {
    let mut violations = Vec::new();
    let mut out = String::with_capacity(text.len());

    for (position, c) in text.chars().enumerate() {
        match PROBLEMATIC_CHARS.iter().find(|(bad, _, _)| *bad == c) {
            Some((_, replacement, name)) => {
                violations.push(Violation {
                    kind: ViolationKind::ProblematicCharacter,
                    severity: Severity::Error,
                    message: format!("Replaced {name} with '{replacement}'"),
                    position: Some(position),
                    suggestion: Some(replacement.to_string()),
                    auto_fixable: true,
                    matched: Some(c.to_string()),
                });
                out.push_str(replacement);
            }
            None => out.push(c),
        }
    }

    (violations, out)
}

fn find_cliches(text: &str) -> Vec<Violation> {
    let mut found: Vec<Violation> = CLICHES
        .iter()
        .flat_map(|cliche| {
            cliche.regex.find_iter(text).map(move |m| Violation {
                kind: ViolationKind::Cliche,
                severity: Severity::Warning,
                message: format!(
                    "Avoid the {} \"{}\"",
                    cliche.category.label(),
                    m.as_str()
                ),
                position: Some(text[..m.start()].chars().count()),
                suggestion: suggestion_for(cliche.phrase).map(str::to_string),
                auto_fixable: false,
                matched: Some(m.as_str().to_string()),
            })
        })
        .collect();
    found.sort_by_key(|v| v.position);
    found
}

fn find_ats_issues(text: &str, max_line_length: usize) -> Vec<Violation> {
    let mut issues = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;

        // A lone pipe is fine inline; two or more reads as a table row.
        if line.matches('|').count() >= 2 {
            issues.push(Violation {
                kind: ViolationKind::PipeTable,
                severity: Severity::Warning,
                message: format!(
                    "Line {line_no} looks like a pipe-delimited table, which ATS parsers often garble"
                ),
                position: None,
                suggestion: Some("Use plain lines or bullet points".to_string()),
                auto_fixable: false,
                matched: None,
            });
        }

        let length = line.chars().count();
        if length > max_line_length {
            issues.push(Violation {
                kind: ViolationKind::LineLength,
                severity: Severity::Info,
                message: format!(
                    "Line {line_no} is {length} characters; keep lines under {max_line_length}"
                ),
                position: None,
                suggestion: None,
                auto_fixable: false,
                matched: None,
            });
        }
    }

    issues
}

fn normalize_whitespace(text: &str) -> String {
    let text = EXCESS_NEWLINES.replace_all(text, "\n\n");
    let text = EXCESS_SPACES.replace_all(&text, " ");
    text.trim().to_string()
}
