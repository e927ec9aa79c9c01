//! Normalizer stage: text → text, applied to every ordinary segment before
//! pre-tokenization.

use serde_json::Value;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::{is_nfc_quick, IsNormalized, UnicodeNormalization};

use crate::config::{node_type, sequence_children};
use crate::error::Result;
use crate::pattern::Pattern;

#[derive(Debug, Clone)]
pub enum Normalizer {
    Sequence(Vec<Normalizer>),
    Nfc,
    Nfd,
    Nfkc,
    Nfkd,
    Lowercase,
    /// Prefix non-empty text (Llama-2 uses `"▁"`).
    Prepend(String),
    Replace { pattern: Pattern, content: String },
    Strip { left: bool, right: bool },
    /// Drop combining marks; usually follows `Nfd`.
    StripAccents,
    Bert(BertNormalizer),
}

#[derive(Debug, Clone, Copy)]
pub struct BertNormalizer {
    pub clean_text: bool,
    pub handle_chinese_chars: bool,
    /// `None` follows `lowercase`.
    pub strip_accents: Option<bool>,
    pub lowercase: bool,
}

impl Normalizer {
    /// Build from a `normalizer` node. Unknown types are skipped.
    pub fn from_config(node: &Value) -> Result<Option<Normalizer>> {
        let flag = |key: &str, default: bool| node.get(key).and_then(Value::as_bool).unwrap_or(default);

        let normalizer = match node_type(node) {
            "Sequence" => {
                let mut children = Vec::new();
                for child in sequence_children(node, "normalizers") {
                    children.extend(Normalizer::from_config(child)?);
                }
                Normalizer::Sequence(children)
            }
            "NFC" => Normalizer::Nfc,
            "NFD" => Normalizer::Nfd,
            "NFKC" => Normalizer::Nfkc,
            "NFKD" => Normalizer::Nfkd,
            // SentencePiece charsmaps are NFKC-derived.
            "Precompiled" => Normalizer::Nfkc,
            "Lowercase" => Normalizer::Lowercase,
            "Prepend" => Normalizer::Prepend(
                node.get("prepend").and_then(Value::as_str).unwrap_or("").to_string(),
            ),
            "Replace" => Normalizer::Replace {
                pattern: Pattern::from_config(node, "normalizer")?,
                content: node.get("content").and_then(Value::as_str).unwrap_or("").to_string(),
            },
            "Strip" => Normalizer::Strip {
                left: flag("strip_left", true),
                right: flag("strip_right", true),
            },
            "StripAccents" => Normalizer::StripAccents,
            "BertNormalizer" => Normalizer::Bert(BertNormalizer {
                clean_text: flag("clean_text", true),
                handle_chinese_chars: flag("handle_chinese_chars", true),
                strip_accents: node.get("strip_accents").and_then(Value::as_bool),
                lowercase: flag("lowercase", true),
            }),
            other => {
                tracing::warn!(normalizer = other, "skipping unsupported normalizer");
                return Ok(None);
            }
        };
        Ok(Some(normalizer))
    }

    pub fn normalize(&self, text: &str) -> String {
        match self {
            Normalizer::Sequence(children) => children
                .iter()
                .fold(text.to_string(), |acc, child| child.normalize(&acc)),
            Normalizer::Nfc => {
                if is_nfc_quick(text.chars()) == IsNormalized::Yes {
                    text.to_string()
                } else {
                    text.nfc().collect()
                }
            }
            Normalizer::Nfd => text.nfd().collect(),
            Normalizer::Nfkc => text.nfkc().collect(),
            Normalizer::Nfkd => text.nfkd().collect(),
            Normalizer::Lowercase => text.to_lowercase(),
            Normalizer::Prepend(prefix) => {
                if text.is_empty() {
                    String::new()
                } else {
                    format!("{prefix}{text}")
                }
            }
            Normalizer::Replace { pattern, content } => pattern.replace_all(text, content),
            Normalizer::Strip { left, right } => {
                let mut s = text;
                if *left {
                    s = s.trim_start();
                }
                if *right {
                    s = s.trim_end();
                }
                s.to_string()
            }
            Normalizer::StripAccents => text.chars().filter(|&c| !is_combining_mark(c)).collect(),
            Normalizer::Bert(bert) => bert.normalize(text),
        }
    }
}

impl BertNormalizer {
    fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if self.clean_text {
                if c == '\0' || c == '\u{fffd}' || is_control(c) {
                    continue;
                }
                if c.is_whitespace() {
                    out.push(' ');
                    continue;
                }
            }
            if self.handle_chinese_chars && is_chinese_char(c) {
                out.push(' ');
                out.push(c);
                out.push(' ');
            } else {
                out.push(c);
            }
        }

        if self.strip_accents.unwrap_or(self.lowercase) {
            out = out.nfd().filter(|&c| !is_combining_mark(c)).collect();
        }
        if self.lowercase {
            out = out.to_lowercase();
        }
        out
    }
}

/// Control chars other than the whitespace ones BERT keeps.
fn is_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// CJK Unified Ideographs and their extensions.
fn is_chinese_char(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}
