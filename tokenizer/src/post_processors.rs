//! Post-processor stage: wraps the token sequence in structural tokens.

use serde_json::Value;

use crate::config::{node_type, sequence_children};
use crate::error::{Result, TokenizerError};

/// One element of a `TemplateProcessing` template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePiece {
    /// The input sequence (`$A`).
    Sequence,
    SpecialToken(String),
}

#[derive(Debug, Clone)]
pub enum PostProcessor {
    Sequence(Vec<PostProcessor>),
    TemplateProcessing { single: Vec<TemplatePiece> },
    /// `[CLS] ... [SEP]`.
    Bert { cls: String, sep: String },
    /// `<s> ... </s>`.
    Roberta { cls: String, sep: String },
    /// Offsets only; the token strings pass through.
    ByteLevel,
}

impl PostProcessor {
    /// Build from a `post_processor` node. Unknown types are skipped.
    pub fn from_config(node: &Value) -> Result<Option<PostProcessor>> {
        let processor = match node_type(node) {
            "Sequence" => {
                let mut children = Vec::new();
                for child in sequence_children(node, "processors") {
                    children.extend(PostProcessor::from_config(child)?);
                }
                PostProcessor::Sequence(children)
            }
            "TemplateProcessing" => {
                let single = node
                    .get("single")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        TokenizerError::invalid("post-processor", "template has no `single`")
                    })?
                    .iter()
                    .map(parse_template_piece)
                    .collect::<Result<Vec<_>>>()?;
                PostProcessor::TemplateProcessing { single }
            }
            "BertProcessing" => PostProcessor::Bert {
                cls: token_pair(node, "cls")?,
                sep: token_pair(node, "sep")?,
            },
            "RobertaProcessing" => PostProcessor::Roberta {
                cls: token_pair(node, "cls")?,
                sep: token_pair(node, "sep")?,
            },
            "ByteLevel" => PostProcessor::ByteLevel,
            other => {
                tracing::warn!(post_processor = other, "skipping unsupported post-processor");
                return Ok(None);
            }
        };
        Ok(Some(processor))
    }

    pub fn post_process(&self, tokens: Vec<String>, add_special_tokens: bool) -> Vec<String> {
        match self {
            PostProcessor::Sequence(children) => children
                .iter()
                .fold(tokens, |acc, child| child.post_process(acc, add_special_tokens)),
            PostProcessor::TemplateProcessing { single } => {
                if !add_special_tokens {
                    return tokens;
                }
                let mut tokens = Some(tokens);
                let mut out = Vec::new();
                for piece in single {
                    match piece {
                        TemplatePiece::SpecialToken(token) => out.push(token.clone()),
                        TemplatePiece::Sequence => out.extend(tokens.take().unwrap_or_default()),
                    }
                }
                out
            }
            PostProcessor::Bert { cls, sep } | PostProcessor::Roberta { cls, sep } => {
                if !add_special_tokens {
                    return tokens;
                }
                let mut out = Vec::with_capacity(tokens.len() + 2);
                out.push(cls.clone());
                out.extend(tokens);
                out.push(sep.clone());
                out
            }
            PostProcessor::ByteLevel => tokens,
        }
    }
}

/// `{"SpecialToken": {"id": "<s>"}}`, `{"Sequence": {"id": "A"}}`, or the
/// `"$A"` / `"<s>"` string shorthand.
fn parse_template_piece(value: &Value) -> Result<TemplatePiece> {
    if let Some(s) = value.as_str() {
        return Ok(if s.starts_with('$') {
            TemplatePiece::Sequence
        } else {
            TemplatePiece::SpecialToken(s.to_string())
        });
    }
    if value.get("Sequence").is_some() {
        return Ok(TemplatePiece::Sequence);
    }
    value
        .get("SpecialToken")
        .and_then(|t| t.get("id"))
        .and_then(Value::as_str)
        .map(|id| TemplatePiece::SpecialToken(id.to_string()))
        .ok_or_else(|| TokenizerError::invalid("post-processor", format!("bad template piece {value}")))
}

/// `"cls": ["[CLS]", 101]`
fn token_pair(node: &Value, key: &str) -> Result<String> {
    node.get(key)
        .and_then(|pair| pair.get(0))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TokenizerError::invalid("post-processor", format!("missing `{key}` token")))
}
