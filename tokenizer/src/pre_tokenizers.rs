//! Pre-tokenizer stage: one normalized segment → pieces for the model.
//!
//! Every variant works in two steps: find delimiter spans, then assemble
//! pieces according to a [`SplitBehavior`]. The same helper serves
//! `Split`, `Punctuation`, `Digits`, `Metaspace` and the BERT splitter.

use fancy_regex::Regex;
use serde_json::Value;

use crate::byte_level;
use crate::config::{node_type, sequence_children};
use crate::error::{Result, TokenizerError};
use crate::pattern::Pattern;

/// The GPT-2 split regex.
const GPT2_REGEX: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What happens to a delimiter when a segment is split on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitBehavior {
    Removed,
    Isolated,
    MergedWithPrevious,
    MergedWithNext,
    /// Adjacent delimiters form one piece.
    Contiguous,
}

impl SplitBehavior {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "Removed" => SplitBehavior::Removed,
            "Isolated" => SplitBehavior::Isolated,
            "MergedWithPrevious" => SplitBehavior::MergedWithPrevious,
            "MergedWithNext" => SplitBehavior::MergedWithNext,
            "Contiguous" => SplitBehavior::Contiguous,
            other => {
                return Err(TokenizerError::invalid(
                    "pre-tokenizer",
                    format!("unknown split behavior {other:?}"),
                ))
            }
        })
    }
}

/// When Metaspace adds the replacement char in front of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrependScheme {
    Always,
    /// Only at the very start of the input, never after an added token.
    First,
    Never,
}

#[derive(Debug, Clone)]
pub enum PreTokenizer {
    Sequence(Vec<PreTokenizer>),
    /// Split with the GPT-2 regex (optional) and remap bytes to GPT-2 chars.
    ByteLevel {
        add_prefix_space: bool,
        regex: Option<Regex>,
    },
    /// Replace spaces with `replacement` and split before each one.
    Metaspace {
        replacement: char,
        prepend_scheme: PrependScheme,
        split: bool,
    },
    Split {
        pattern: Pattern,
        behavior: SplitBehavior,
        invert: bool,
    },
    /// Runs of word chars and runs of other non-space chars.
    Whitespace,
    WhitespaceSplit,
    Punctuation(SplitBehavior),
    Digits {
        individual_digits: bool,
    },
    Bert,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl PreTokenizer {
    /// Build from a `pre_tokenizer` node. Unknown types are skipped.
    pub fn from_config(node: &Value) -> Result<Option<PreTokenizer>> {
        let flag = |key: &str, default: bool| node.get(key).and_then(Value::as_bool).unwrap_or(default);

        let pre_tokenizer = match node_type(node) {
            "Sequence" => {
                let mut children = Vec::new();
                for child in sequence_children(node, "pretokenizers") {
                    children.extend(PreTokenizer::from_config(child)?);
                }
                PreTokenizer::Sequence(children)
            }
            "ByteLevel" => PreTokenizer::ByteLevel {
                add_prefix_space: flag("add_prefix_space", true),
                regex: if flag("use_regex", true) {
                    Some(Regex::new(GPT2_REGEX).map_err(|err| {
                        TokenizerError::invalid("pre-tokenizer", err.to_string())
                    })?)
                } else {
                    None
                },
            },
            "Metaspace" => {
                let replacement = node
                    .get("replacement")
                    .and_then(Value::as_str)
                    .and_then(|s| s.chars().next())
                    .unwrap_or('▁');
                // Older files only carry `add_prefix_space`; false means never.
                let prepend_scheme = if !flag("add_prefix_space", true) {
                    PrependScheme::Never
                } else {
                    match node.get("prepend_scheme").and_then(Value::as_str).unwrap_or("always") {
                        "always" => PrependScheme::Always,
                        "first" => PrependScheme::First,
                        "never" => PrependScheme::Never,
                        other => {
                            return Err(TokenizerError::invalid(
                                "pre-tokenizer",
                                format!("unknown prepend_scheme {other:?}"),
                            ))
                        }
                    }
                };
                PreTokenizer::Metaspace {
                    replacement,
                    prepend_scheme,
                    split: flag("split", true),
                }
            }
            "Split" => PreTokenizer::Split {
                pattern: Pattern::from_config(node, "pre-tokenizer")?,
                behavior: SplitBehavior::parse(
                    node.get("behavior").and_then(Value::as_str).unwrap_or("Isolated"),
                )?,
                invert: flag("invert", false),
            },
            "Whitespace" => PreTokenizer::Whitespace,
            "WhitespaceSplit" => PreTokenizer::WhitespaceSplit,
            "Punctuation" => PreTokenizer::Punctuation(SplitBehavior::parse(
                node.get("behavior").and_then(Value::as_str).unwrap_or("Isolated"),
            )?),
            "Digits" => PreTokenizer::Digits {
                individual_digits: flag("individual_digits", false),
            },
            "BertPreTokenizer" => PreTokenizer::Bert,
            other => {
                tracing::warn!(pre_tokenizer = other, "skipping unsupported pre-tokenizer");
                return Ok(None);
            }
        };
        Ok(Some(pre_tokenizer))
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

impl PreTokenizer {
    /// Split one segment. `first_segment` is true only for the segment at
    /// the very start of the input.
    pub fn pre_tokenize(&self, text: &str, first_segment: bool) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        match self {
            PreTokenizer::Sequence(children) => {
                let mut pieces = vec![text.to_string()];
                for child in children {
                    pieces = pieces
                        .iter()
                        .enumerate()
                        .flat_map(|(i, piece)| child.pre_tokenize(piece, first_segment && i == 0))
                        .collect();
                }
                pieces
            }
            PreTokenizer::ByteLevel {
                add_prefix_space,
                regex,
            } => {
                let text = if *add_prefix_space && !text.starts_with(' ') {
                    format!(" {text}")
                } else {
                    text.to_string()
                };
                let pieces = match regex {
                    Some(re) => {
                        let spans: Vec<(usize, usize)> = re
                            .find_iter(&text)
                            .map_while(|m| m.ok())
                            .map(|m| (m.start(), m.end()))
                            .collect();
                        split_spans(&text, &spans, SplitBehavior::Isolated, false)
                    }
                    None => vec![text],
                };
                pieces.iter().map(|p| byte_level::encode_bytes(p)).collect()
            }
            PreTokenizer::Metaspace {
                replacement,
                prepend_scheme,
                split,
            } => {
                let mut rep_buf = [0u8; 4];
                let rep: &str = replacement.encode_utf8(&mut rep_buf);
                let mut replaced = text.replace(' ', rep);
                let prepend = match prepend_scheme {
                    PrependScheme::Always => true,
                    PrependScheme::First => first_segment,
                    PrependScheme::Never => false,
                };
                if prepend && !replaced.starts_with(*replacement) {
                    replaced.insert(0, *replacement);
                }
                if *split {
                    let spans = char_spans(&replaced, |c| c == *replacement);
                    split_spans(&replaced, &spans, SplitBehavior::MergedWithNext, false)
                } else {
                    vec![replaced]
                }
            }
            PreTokenizer::Split {
                pattern,
                behavior,
                invert,
            } => split_spans(text, &pattern.find_matches(text), *behavior, *invert),
            PreTokenizer::Whitespace => whitespace_runs(text),
            PreTokenizer::WhitespaceSplit => {
                text.split_whitespace().map(str::to_string).collect()
            }
            PreTokenizer::Punctuation(behavior) => {
                split_spans(text, &char_spans(text, is_punctuation), *behavior, false)
            }
            PreTokenizer::Digits { individual_digits } => {
                let mut spans = char_spans(text, |c| c.is_ascii_digit());
                if !individual_digits {
                    spans = join_adjacent(spans);
                }
                split_spans(text, &spans, SplitBehavior::Isolated, false)
            }
            PreTokenizer::Bert => text
                .split_whitespace()
                .flat_map(|word| {
                    split_spans(word, &char_spans(word, is_punctuation), SplitBehavior::Isolated, false)
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Assemble pieces from delimiter spans.
///
/// `spans` must be sorted and non-overlapping. With `invert`, the spans are
/// the content and the gaps between them are the delimiters.
pub fn split_spans(
    text: &str,
    spans: &[(usize, usize)],
    behavior: SplitBehavior,
    invert: bool,
) -> Vec<String> {
    // (start, end, is_delimiter) covering all of `text`.
    let mut parts: Vec<(usize, usize, bool)> = Vec::with_capacity(spans.len() * 2 + 1);
    let mut last = 0;
    for &(start, end) in spans {
        if start > last {
            parts.push((last, start, invert));
        }
        parts.push((start, end, !invert));
        last = end;
    }
    if last < text.len() {
        parts.push((last, text.len(), invert));
    }

    let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(parts.len());
    match behavior {
        SplitBehavior::Removed => {
            ranges.extend(parts.iter().filter(|p| !p.2).map(|p| (p.0, p.1)));
        }
        SplitBehavior::Isolated => {
            ranges.extend(parts.iter().map(|p| (p.0, p.1)));
        }
        SplitBehavior::Contiguous => {
            let mut prev_delim = false;
            for &(start, end, delim) in &parts {
                match ranges.last_mut() {
                    Some(last) if delim && prev_delim => last.1 = end,
                    _ => ranges.push((start, end)),
                }
                prev_delim = delim;
            }
        }
        SplitBehavior::MergedWithPrevious => {
            let mut prev_delim = false;
            for &(start, end, delim) in &parts {
                match ranges.last_mut() {
                    Some(last) if delim && !prev_delim => last.1 = end,
                    _ => ranges.push((start, end)),
                }
                prev_delim = delim;
            }
        }
        SplitBehavior::MergedWithNext => {
            // Walk backwards so a delimiter can join the piece after it.
            let mut next_delim = false;
            for &(start, end, delim) in parts.iter().rev() {
                match ranges.last_mut() {
                    Some(last) if delim && !next_delim => last.0 = start,
                    _ => ranges.push((start, end)),
                }
                next_delim = delim;
            }
            ranges.reverse();
        }
    }

    ranges
        .into_iter()
        .filter(|(start, end)| start < end)
        .map(|(start, end)| text[start..end].to_string())
        .collect()
}

/// One span per char matching `pred`.
fn char_spans(text: &str, pred: impl Fn(char) -> bool) -> Vec<(usize, usize)> {
    text.char_indices()
        .filter(|&(_, c)| pred(c))
        .map(|(i, c)| (i, i + c.len_utf8()))
        .collect()
}

fn join_adjacent(spans: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    let mut joined: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match joined.last_mut() {
            Some(last) if last.1 == start => last.1 = end,
            _ => joined.push((start, end)),
        }
    }
    joined
}

/// `\w+|[^\w\s]+`
fn whitespace_runs(text: &str) -> Vec<String> {
    #[derive(PartialEq, Clone, Copy)]
    enum Class {
        Space,
        Word,
        Other,
    }
    let class = |c: char| {
        if c.is_whitespace() {
            Class::Space
        } else if c.is_alphanumeric() || c == '_' {
            Class::Word
        } else {
            Class::Other
        }
    };

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_class = Class::Space;
    for c in text.chars() {
        let cls = class(c);
        if cls != current_class && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if cls != Class::Space {
            current.push(c);
        }
        current_class = cls;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// ASCII punctuation plus the common Unicode punctuation blocks.
pub(crate) fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c as u32,
            0xA1 | 0xA7 | 0xAB | 0xB6 | 0xB7 | 0xBB | 0xBF
                | 0x2010..=0x2027
                | 0x2030..=0x205E
                | 0x2E00..=0x2E7F
                | 0x3001..=0x3003
                | 0x3008..=0x3011
                | 0x3014..=0x301F
                | 0xFF01..=0xFF0F
                | 0xFF1A..=0xFF20
                | 0xFF3B..=0xFF40
                | 0xFF5B..=0xFF65
        )
}
