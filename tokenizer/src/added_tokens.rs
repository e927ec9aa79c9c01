//! Splits raw input around added tokens before any other stage runs.

use regex::{Regex, RegexBuilder};

use crate::config::AddedToken;

/// A piece of the input as seen by the added-token matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Matched added-token content (whitespace absorbed by `lstrip` /
    /// `rstrip` is dropped).
    Added(&'a str),
    /// Ordinary text between matches; goes through the full pipeline.
    Text(&'a str),
}

/// Leftmost match of all added tokens, longest content first.
#[derive(Debug, Clone, Default)]
pub struct AddedTokenMatcher {
    regex: Option<Regex>,
}

impl AddedTokenMatcher {
    pub fn new(tokens: &[AddedToken]) -> Self {
        let mut entries: Vec<&AddedToken> =
            tokens.iter().filter(|t| !t.content.is_empty()).collect();
        if entries.is_empty() {
            return AddedTokenMatcher { regex: None };
        }
        // Stable: equal lengths keep their configuration order.
        entries.sort_by_key(|t| std::cmp::Reverse(t.content.chars().count()));

        let alternation = entries
            .iter()
            .map(|t| {
                format!(
                    "{}({}){}",
                    if t.lstrip { r"\s*" } else { "" },
                    regex::escape(&t.content),
                    if t.rstrip { r"\s*" } else { "" },
                )
            })
            .collect::<Vec<_>>()
            .join("|");

        let regex = match RegexBuilder::new(&alternation).size_limit(64 << 20).build() {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::warn!(%err, tokens = entries.len(), "added-token matcher disabled");
                None
            }
        };
        AddedTokenMatcher { regex }
    }

    pub fn is_enabled(&self) -> bool {
        self.regex.is_some()
    }

    /// Split `text` into added-token and ordinary segments, in order.
    /// Empty ordinary segments are omitted.
    pub fn split<'a>(&self, text: &'a str) -> Vec<Segment<'a>> {
        if text.is_empty() {
            return Vec::new();
        }
        let Some(regex) = &self.regex else {
            return vec![Segment::Text(text)];
        };

        let mut segments = Vec::new();
        let mut last = 0;
        for caps in regex.captures_iter(text) {
            let (Some(whole), Some(token)) = (caps.get(0), caps.iter().skip(1).flatten().next())
            else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Text(&text[last..whole.start()]));
            }
            segments.push(Segment::Added(token.as_str()));
            last = whole.end();
        }
        if last < text.len() {
            segments.push(Segment::Text(&text[last..]));
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(content: &str) -> AddedToken {
        AddedToken::new(0, content, true)
    }

    #[test]
    fn test_longest_match_wins() {
        let m = AddedTokenMatcher::new(&[token("a"), token("ab")]);
        assert_eq!(
            m.split("xaby"),
            vec![Segment::Text("x"), Segment::Added("ab"), Segment::Text("y")]
        );
        assert_eq!(m.split("xa"), vec![Segment::Text("x"), Segment::Added("a")]);
    }

    #[test]
    fn test_rstrip_absorbs_whitespace() {
        let mut sep = token("<sep>");
        sep.rstrip = true;
        let m = AddedTokenMatcher::new(&[sep]);
        assert_eq!(
            m.split("hi <sep>   there"),
            vec![Segment::Text("hi "), Segment::Added("<sep>"), Segment::Text("there")]
        );
    }

    #[test]
    fn test_lstrip_absorbs_whitespace() {
        let mut mask = token("<mask>");
        mask.lstrip = true;
        let m = AddedTokenMatcher::new(&[mask]);
        assert_eq!(
            m.split("a  <mask>b"),
            vec![Segment::Text("a"), Segment::Added("<mask>"), Segment::Text("b")]
        );
    }

    #[test]
    fn test_adjacent_tokens_have_no_empty_text() {
        let m = AddedTokenMatcher::new(&[token("<s>"), token("</s>")]);
        assert_eq!(m.split("<s></s>"), vec![Segment::Added("<s>"), Segment::Added("</s>")]);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let m = AddedTokenMatcher::new(&[token("<|im_start|>"), token("[.*]")]);
        assert_eq!(
            m.split("<|im_start|>x[.*]"),
            vec![Segment::Added("<|im_start|>"), Segment::Text("x"), Segment::Added("[.*]")]
        );
    }

    #[test]
    fn test_empty_set() {
        let m = AddedTokenMatcher::new(&[token("")]);
        assert!(!m.is_enabled());
        assert_eq!(m.split("plain"), vec![Segment::Text("plain")]);
        assert!(m.split("").is_empty());
    }
}
