//! # Response Decoding
//!
//! Pulls a structured value out of free-form model output. The decoder only
//! reports whether it succeeded; what to substitute on failure is the
//! caller's decision.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

/// Outcome of a decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Parsed(T),
    Unparseable,
}

impl<T> Decoded<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Decoded::Parsed(value) => Some(value),
            Decoded::Unparseable => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Decoded::Parsed(_))
    }

    /// Use the parsed value or build a substitute
    pub fn unwrap_or_else<F: FnOnce() -> T>(self, fallback: F) -> T {
        match self {
            Decoded::Parsed(value) => value,
            Decoded::Unparseable => fallback(),
        }
    }
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").ok())
        .as_ref()
}

/// Decode `text` as `T`, trying in order: the whole text, fenced code
/// blocks, the outermost `{...}` span, then the outermost `[...]` span.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Decoded<T> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Decoded::Parsed(value);
    }

    if let Some(re) = fence_pattern() {
        for caps in re.captures_iter(text) {
            if let Some(body) = caps.get(1) {
                if let Ok(value) = serde_json::from_str(body.as_str().trim()) {
                    return Decoded::Parsed(value);
                }
            }
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(span) = outer_span(text, open, close) {
            if let Ok(value) = serde_json::from_str(span) {
                return Decoded::Parsed(value);
            }
        }
    }

    Decoded::Unparseable
}

fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Counts {
        gen_ai_mentions: u32,
        ml_mentions: u32,
    }

    #[test]
    fn test_plain_json() {
        let decoded: Decoded<Counts> = decode_json(r#" {"gen_ai_mentions": 3, "ml_mentions": 4} "#);
        assert_eq!(
            decoded,
            Decoded::Parsed(Counts {
                gen_ai_mentions: 3,
                ml_mentions: 4
            })
        );
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here you go:\n```json\n{\"gen_ai_mentions\": 1, \"ml_mentions\": 2}\n```\nThanks";
        let decoded: Decoded<Counts> = decode_json(text);
        assert_eq!(decoded.ok().map(|c| c.ml_mentions), Some(2));
    }

    #[test]
    fn test_object_embedded_in_prose() {
        let text = "Result: {\"gen_ai_mentions\": 7, \"ml_mentions\": 0} (estimated)";
        let decoded: Decoded<Counts> = decode_json(text);
        assert_eq!(decoded.ok().map(|c| c.gen_ai_mentions), Some(7));
    }

    #[test]
    fn test_array_embedded_in_prose() {
        let text = "Companies:\n[\"Oracle\", \"IBM\"]\nDone.";
        let decoded: Decoded<Vec<String>> = decode_json(text);
        assert_eq!(decoded, Decoded::Parsed(vec!["Oracle".to_string(), "IBM".to_string()]));
    }

    #[test]
    fn test_array_of_objects_prefers_array_shape() {
        let text = "[{\"gen_ai_mentions\": 1, \"ml_mentions\": 1}, {\"gen_ai_mentions\": 2, \"ml_mentions\": 2}]";
        let decoded: Decoded<Vec<Counts>> = decode_json(text);
        assert_eq!(decoded.ok().map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_unparseable() {
        let decoded: Decoded<Counts> = decode_json("I could not find any filings.");
        assert_eq!(decoded, Decoded::Unparseable);

        let wrong_shape: Decoded<Counts> = decode_json(r#"{"unexpected": true}"#);
        assert!(!wrong_shape.is_parsed());
    }

    #[test]
    fn test_unwrap_or_else() {
        let decoded: Decoded<Vec<u32>> = decode_json("nothing here");
        assert_eq!(decoded.unwrap_or_else(|| vec![0]), vec![0]);
    }
}
