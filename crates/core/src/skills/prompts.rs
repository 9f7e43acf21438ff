//! Prompt templates bundled at compile time.
//!
//! Placeholders are written `{name}` and filled with [`render`].

/// Document locator role
pub const LOCATOR: &str = include_str!("defaults/locator.md");

/// Document locator task, takes `{companies}`
pub const LOCATOR_TASK: &str = include_str!("defaults/locator_task.md");

/// Per-company analyst role, takes `{company}`
pub const ANALYST: &str = include_str!("defaults/analyst.md");

/// Analyst task over supplied document text, takes `{company}` and `{content}`
pub const ANALYST_DOCUMENT_TASK: &str = include_str!("defaults/analyst_document_task.md");

/// Analyst task from model knowledge alone, takes `{company}`
pub const ANALYST_KNOWLEDGE_TASK: &str = include_str!("defaults/analyst_knowledge_task.md");

/// Synthesis role
pub const SYNTHESIS: &str = include_str!("defaults/synthesis.md");

/// Synthesis task (report outline)
pub const SYNTHESIS_TASK: &str = include_str!("defaults/synthesis_task.md");

/// All bundled prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("locator", LOCATOR),
        ("locator_task", LOCATOR_TASK),
        ("analyst", ANALYST),
        ("analyst_document_task", ANALYST_DOCUMENT_TASK),
        ("analyst_knowledge_task", ANALYST_KNOWLEDGE_TASK),
        ("synthesis", SYNTHESIS),
        ("synthesis_task", SYNTHESIS_TASK),
    ]
}

/// Substitute `{name}` placeholders in order.
///
/// Later substitutions never see placeholders introduced by earlier values,
/// so put free-form text (document content) last.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.trim_end().to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}
