//! Constraint Engine: house-style pass over generated documents.
//!
//! Runs after every generation call and before anything is persisted:
//! 1. repair problematic characters (counted before replacement)
//! 2. flag cliches
//! 3. flag ATS-unfriendly formatting
//! 4. normalize whitespace
//!
//! Pure and infallible. Empty input yields an all-zero result.

use serde::Serialize;

pub mod cliches;
pub mod engine;

pub use engine::{enforce_constraints, enforce_constraints_with};

/// Default ATS line limit in characters.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    ProblematicCharacter,
    Cliche,
    PipeTable,
    LineLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub message: String,
    /// Character (not byte) offset into the text the violation was found in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub auto_fixable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ConstraintConfig {
    pub max_line_length: usize,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintResult {
    pub text: String,
    pub violations: Vec<Violation>,
    /// Problematic characters replaced, counted before replacement.
    pub violations_fixed: usize,
    /// Flag-only violations (cliches and ATS issues).
    pub violations_remaining: usize,
}

impl ConstraintResult {
    pub fn empty(text: &str) -> Self {
        Self {
            text: text.to_string(),
            violations: Vec::new(),
            violations_fixed: 0,
            violations_remaining: 0,
        }
    }

    /// Messages of WARNING-severity violations, the set persisted with a document.
    pub fn warnings(&self) -> Vec<String> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
            .map(|v| v.message.clone())
            .collect()
    }
}
