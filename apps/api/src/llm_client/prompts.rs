// Shared prompt constants and prompt-building utilities.
// Each feature that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// House style appended to every document-generation system prompt.
/// The constraint engine repairs or flags anything that slips through.
pub const STYLE_INSTRUCTION: &str = "\
    STYLE RULES: Use plain ASCII punctuation only. Never use em dashes, en dashes, \
    curly quotes, ellipsis characters or bullet glyphs; use '-', straight quotes and '...'. \
    Avoid buzzwords and cliches such as 'synergy', 'leverage', 'spearhead', \
    'results-driven', 'team player' or 'think outside the box'. Prefer concrete verbs \
    and measurable outcomes. Do not use tables or pipe characters for layout. \
    Keep lines under 100 characters.";

/// Instruction against inventing facts missing from the provided context.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only use facts present in the candidate experience, research and notes \
    provided. Do NOT invent employers, metrics, dates, or company facts. \
    If a detail is not in the context, leave it out.";

/// Fills `{name}` placeholders in one pass. Substituted text is never rescanned,
/// and braces that do not name a known placeholder are left as they are.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hit = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match hit {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template_does_not_expand_substituted_text() {
        let rendered = render_template(
            "At {company}: {keywords}",
            &[("company", "Acme {keywords}"), ("keywords", "Rust")],
        );
        assert_eq!(rendered, "At Acme {keywords}: Rust");
    }

    #[test]
    fn test_render_template_keeps_unknown_braces() {
        let rendered = render_template(r#"{"kind": "{kind}"} {missing"#, &[("kind", "skill")]);
        assert_eq!(rendered, r#"{"kind": "skill"} {missing"#);
    }
}
