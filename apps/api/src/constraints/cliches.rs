use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClicheCategory {
    Buzzword,
    OverusedVerb,
    SelfDescription,
    Filler,
}

impl ClicheCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ClicheCategory::Buzzword => "buzzword",
            ClicheCategory::OverusedVerb => "overused action verb",
            ClicheCategory::SelfDescription => "self-description cliche",
            ClicheCategory::Filler => "filler phrase",
        }
    }
}

pub struct Cliche {
    pub category: ClicheCategory,
    /// Canonical phrase, used in messages and as the suggestion lookup key.
    pub phrase: &'static str,
    pub regex: Regex,
}

// (category, canonical phrase, pattern body). Bodies are wrapped in a
// case-insensitive word-boundary group when compiled.
const CLICHE_TABLE: &[(ClicheCategory, &str, &str)] = &[
    // Buzzwords
    (ClicheCategory::Buzzword, "synergy", r"synerg(?:y|ies|istic)"),
    (ClicheCategory::Buzzword, "leverage", r"leverag(?:e|ed|es|ing)"),
    (ClicheCategory::Buzzword, "paradigm shift", r"paradigm[- ]shifts?"),
    (ClicheCategory::Buzzword, "best of breed", r"best[- ]of[- ]breed"),
    (ClicheCategory::Buzzword, "cutting-edge", r"cutting[- ]edge"),
    (ClicheCategory::Buzzword, "game changer", r"game[- ]chang(?:er|ers|ing)"),
    (ClicheCategory::Buzzword, "move the needle", r"mov(?:e|ed|ing) the needle"),
    (ClicheCategory::Buzzword, "value-add", r"value[- ]add(?:ed)?"),
    (ClicheCategory::Buzzword, "agile", r"agile"),
    (ClicheCategory::Buzzword, "disruptive", r"disrupt(?:ive|ion)"),
    // Overused action verbs
    (ClicheCategory::OverusedVerb, "spearhead", r"spearhead(?:ed|ing|s)?"),
    (ClicheCategory::OverusedVerb, "utilize", r"utiliz(?:e|ed|es|ing)"),
    (ClicheCategory::OverusedVerb, "champion", r"champion(?:ed|ing)"),
    (ClicheCategory::OverusedVerb, "facilitate", r"facilitat(?:e|ed|es|ing)"),
    (ClicheCategory::OverusedVerb, "orchestrate", r"orchestrat(?:e|ed|es|ing)"),
    // Self-description cliches
    (ClicheCategory::SelfDescription, "results-driven", r"results[- ]driven"),
    (ClicheCategory::SelfDescription, "detail-oriented", r"detail[- ]oriented"),
    (ClicheCategory::SelfDescription, "team player", r"team[- ]players?"),
    (ClicheCategory::SelfDescription, "self-starter", r"self[- ]starters?"),
    (ClicheCategory::SelfDescription, "go-getter", r"go[- ]getters?"),
    (ClicheCategory::SelfDescription, "hard-working", r"hard[- ]?working"),
    (ClicheCategory::SelfDescription, "passionate about", r"passionate about"),
    (ClicheCategory::SelfDescription, "think outside the box", r"think(?:ing)? outside (?:of )?the box"),
    (ClicheCategory::SelfDescription, "proven track record", r"proven track record"),
    // Filler
    (ClicheCategory::Filler, "in order to", r"in order to"),
    (ClicheCategory::Filler, "responsible for", r"responsible for"),
    (ClicheCategory::Filler, "successfully", r"successfully"),
    (ClicheCategory::Filler, "at the end of the day", r"at the end of the day"),
    (ClicheCategory::Filler, "needless to say", r"needless to say"),
];

/// Replacement hints. Not every cliche has one.
const SUGGESTIONS: &[(&str, &str)] = &[
    ("synergy", "collaboration"),
    ("leverage", "use"),
    ("utilize", "use"),
    ("spearhead", "led"),
    ("champion", "advocated for"),
    ("facilitate", "ran"),
    ("in order to", "to"),
    ("responsible for", "owned"),
    ("cutting-edge", "modern"),
    ("think outside the box", "describe the specific idea instead"),
    ("results-driven", "state the result"),
];

lazy_static! {
    pub static ref CLICHES: Vec<Cliche> = CLICHE_TABLE
        .iter()
        .filter_map(|(category, phrase, body)| {
            Regex::new(&format!(r"(?i)\b(?:{body})\b"))
                .ok()
                .map(|regex| Cliche {
                    category: *category,
                    phrase: *phrase,
                    regex,
                })
        })
        .collect();
}

pub fn suggestion_for(phrase: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(key, _)| *key == phrase)
        .map(|(_, hint)| *hint)
}
