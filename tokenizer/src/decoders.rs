//! Decoder stage: token strings → text fragments, plus the fixed cleanup
//! pass applied to decoded text.

use std::collections::HashSet;

use serde_json::Value;

use crate::byte_level;
use crate::config::{node_type, sequence_children};
use crate::error::Result;
use crate::pattern::{replace_str, Pattern};

/// Spacing artifacts undone by cleanup, applied once each, in order.
const CLEANUP_RULES: &[(&str, &str)] = &[
    (" .", "."),
    (" ?", "?"),
    (" !", "!"),
    (" ,", ","),
    (" ' ", "'"),
    (" n't", "n't"),
    (" 'm", "'m"),
    (" 's", "'s"),
    (" 've", "'ve"),
    (" 're", "'re"),
];

/// Remove the spaces tokenization leaves before punctuation and
/// contractions.
pub fn clean_up_tokenization(text: &str) -> String {
    CLEANUP_RULES
        .iter()
        .fold(text.to_string(), |acc, (from, to)| replace_str(&acc, from, to))
}

#[derive(Debug, Clone)]
pub enum Decoder {
    Sequence(Vec<Decoder>),
    /// GPT-2 chars → bytes → UTF-8. Added tokens pass through verbatim.
    ByteLevel { added_tokens: HashSet<String> },
    /// Coalesce `<0xNN>` runs into UTF-8 text.
    ByteFallback,
    Replace { pattern: Pattern, content: String },
    /// Join everything into one token.
    Fuse,
    /// Remove up to `start` leading and `stop` trailing `content` chars.
    Strip { content: char, start: usize, stop: usize },
    WordPiece { prefix: String, cleanup: bool },
    /// Replacement char → space; drop the prefix space of the first token.
    Metaspace { replacement: char, strip_prefix: bool },
}

impl Decoder {
    /// Build from a `decoder` node. Unknown types are skipped.
    ///
    /// `added_tokens` holds the contents of every added token, which the
    /// byte-level decoder must not remap.
    pub fn from_config(node: &Value, added_tokens: &HashSet<String>) -> Result<Option<Decoder>> {
        let str_field = |key: &str| node.get(key).and_then(Value::as_str);
        let count = |key: &str| node.get(key).and_then(Value::as_u64).unwrap_or(0) as usize;

        let decoder = match node_type(node) {
            "Sequence" => {
                let mut children = Vec::new();
                for child in sequence_children(node, "decoders") {
                    children.extend(Decoder::from_config(child, added_tokens)?);
                }
                Decoder::Sequence(children)
            }
            "ByteLevel" => Decoder::ByteLevel {
                added_tokens: added_tokens.clone(),
            },
            "ByteFallback" => Decoder::ByteFallback,
            "Replace" => Decoder::Replace {
                pattern: Pattern::from_config(node, "decoder")?,
                content: str_field("content").unwrap_or("").to_string(),
            },
            "Fuse" => Decoder::Fuse,
            "Strip" => Decoder::Strip {
                content: str_field("content").and_then(|s| s.chars().next()).unwrap_or(' '),
                start: count("start"),
                stop: count("stop"),
            },
            "WordPiece" => Decoder::WordPiece {
                prefix: str_field("prefix").unwrap_or("##").to_string(),
                cleanup: node.get("cleanup").and_then(Value::as_bool).unwrap_or(true),
            },
            "Metaspace" => {
                let add_prefix_space = node
                    .get("add_prefix_space")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                Decoder::Metaspace {
                    replacement: str_field("replacement")
                        .and_then(|s| s.chars().next())
                        .unwrap_or('▁'),
                    strip_prefix: add_prefix_space && str_field("prepend_scheme") != Some("never"),
                }
            }
            other => {
                tracing::warn!(decoder = other, "skipping unsupported decoder");
                return Ok(None);
            }
        };
        Ok(Some(decoder))
    }

    pub fn decode(&self, tokens: Vec<String>) -> Vec<String> {
        match self {
            Decoder::Sequence(children) => children
                .iter()
                .fold(tokens, |acc, child| child.decode(acc)),
            Decoder::ByteLevel { added_tokens } => {
                let mut out = Vec::new();
                let mut pending = String::new();
                for token in tokens {
                    if added_tokens.contains(&token) {
                        if !pending.is_empty() {
                            out.push(byte_level::decode_chars(&std::mem::take(&mut pending)));
                        }
                        out.push(token);
                    } else {
                        pending.push_str(&token);
                    }
                }
                if !pending.is_empty() {
                    out.push(byte_level::decode_chars(&pending));
                }
                out
            }
            Decoder::ByteFallback => {
                let mut out = Vec::with_capacity(tokens.len());
                let mut bytes: Vec<u8> = Vec::new();
                for token in tokens {
                    if let Some(byte) = parse_byte_token(&token) {
                        bytes.push(byte);
                        continue;
                    }
                    if !bytes.is_empty() {
                        out.push(flush_bytes(std::mem::take(&mut bytes)));
                    }
                    out.push(token);
                }
                if !bytes.is_empty() {
                    out.push(flush_bytes(bytes));
                }
                out
            }
            Decoder::Replace { pattern, content } => tokens
                .iter()
                .map(|t| pattern.replace_all(t, content))
                .collect(),
            Decoder::Fuse => {
                if tokens.is_empty() {
                    tokens
                } else {
                    vec![tokens.concat()]
                }
            }
            Decoder::Strip {
                content,
                start,
                stop,
            } => tokens
                .iter()
                .map(|t| strip_token(t, *content, *start, *stop))
                .collect(),
            Decoder::WordPiece { prefix, cleanup } => tokens
                .into_iter()
                .enumerate()
                .map(|(i, token)| {
                    let token = if i == 0 {
                        token
                    } else if let Some(rest) = token.strip_prefix(prefix.as_str()) {
                        rest.to_string()
                    } else {
                        format!(" {token}")
                    };
                    if *cleanup {
                        clean_up_tokenization(&token)
                    } else {
                        token
                    }
                })
                .collect(),
            Decoder::Metaspace {
                replacement,
                strip_prefix,
            } => tokens
                .iter()
                .enumerate()
                .map(|(i, token)| {
                    let replaced: String = token
                        .chars()
                        .map(|c| if c == *replacement { ' ' } else { c })
                        .collect();
                    match replaced.strip_prefix(' ') {
                        Some(rest) if i == 0 && *strip_prefix => rest.to_string(),
                        _ => replaced,
                    }
                })
                .collect(),
        }
    }
}

/// `<0xNN>` → byte.
fn parse_byte_token(token: &str) -> Option<u8> {
    let hex = token.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// Invalid sequences become one replacement char per byte.
fn flush_bytes(bytes: Vec<u8>) -> String {
    let n = bytes.len();
    String::from_utf8(bytes).unwrap_or_else(|_| "\u{FFFD}".repeat(n))
}

fn strip_token(token: &str, content: char, start: usize, stop: usize) -> String {
    let mut s = token;
    for _ in 0..start {
        match s.strip_prefix(content) {
            Some(rest) => s = rest,
            None => break,
        }
    }
    for _ in 0..stop {
        match s.strip_suffix(content) {
            Some(rest) => s = rest,
            None => break,
        }
    }
    s.to_string()
}
