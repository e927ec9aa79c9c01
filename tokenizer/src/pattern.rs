//! `{"String": ...}` / `{"Regex": ...}` patterns used by `Replace` and
//! `Split` components.

use fancy_regex::Regex;
use serde_json::Value;

use crate::error::{Result, TokenizerError};

#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    /// Parse the `pattern` field of a component.
    pub fn from_config(node: &Value, kind: &'static str) -> Result<Pattern> {
        let pattern = node
            .get("pattern")
            .ok_or_else(|| TokenizerError::invalid(kind, "missing pattern"))?;
        if let Some(s) = pattern.get("String").and_then(Value::as_str) {
            Ok(Pattern::Literal(s.to_string()))
        } else if let Some(re) = pattern.get("Regex").and_then(Value::as_str) {
            Regex::new(re)
                .map(Pattern::Regex)
                .map_err(|err| TokenizerError::invalid(kind, format!("regex {re:?}: {err}")))
        } else {
            Err(TokenizerError::invalid(kind, format!("unsupported pattern {pattern}")))
        }
    }

    /// Byte ranges of all non-overlapping matches, left to right.
    ///
    /// Regex backtracking failures end the scan early.
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            Pattern::Literal(needle) if needle.is_empty() => Vec::new(),
            Pattern::Literal(needle) => memchr::memmem::find_iter(text.as_bytes(), needle)
                .map(|start| (start, start + needle.len()))
                .collect(),
            Pattern::Regex(re) => re
                .find_iter(text)
                .map_while(|m| m.ok())
                .filter(|m| m.start() < m.end())
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }

    /// Replace every match with `content`.
    pub fn replace_all(&self, text: &str, content: &str) -> String {
        match self {
            Pattern::Literal(needle) => replace_str(text, needle, content),
            Pattern::Regex(_) => splice(text, &self.find_matches(text), content),
        }
    }
}

/// Replace all occurrences of `needle` with `replacement`.
///
/// Uses SIMD-accelerated `memchr::memmem` for searching.
pub fn replace_str(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let finder = memchr::memmem::Finder::new(needle);
    let matches: Vec<(usize, usize)> = finder
        .find_iter(haystack.as_bytes())
        .map(|start| (start, start + needle.len()))
        .collect();
    splice(haystack, &matches, replacement)
}

fn splice(text: &str, matches: &[(usize, usize)], replacement: &str) -> String {
    if matches.is_empty() {
        return text.to_string();
    }
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for &(start, end) in matches {
        result.push_str(&text[last..start]);
        result.push_str(replacement);
        last = end;
    }
    result.push_str(&text[last..]);
    result
}
