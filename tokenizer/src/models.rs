//! Subword models and the class-name registry that selects one.
//!
//! `tokenizer_config.json` names a *tokenizer class* (`"LlamaTokenizerFast"`,
//! `"BertTokenizer"`, ...). The registry strips the `Fast` suffix, maps the
//! class to a [`ModelKind`] and builds the matching model from the `model`
//! section of `tokenizer.json`.

pub mod bpe;
pub mod unigram;
pub mod wordpiece;

use std::collections::HashMap;
use std::fmt;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::config::TokenizerConfig;
use crate::error::{Result, TokenizerError};

pub use bpe::BpeModel;
pub use unigram::UnigramModel;
pub use wordpiece::WordPieceModel;

/// Token ID (the value returned to the caller).
pub type TokenId = u32;

// ---------------------------------------------------------------------------
// Model contract
// ---------------------------------------------------------------------------

/// A configured subword model.
///
/// `id_to_token(token_to_id(t)) == Some(t)` holds for every vocabulary token.
pub trait TokenizingModel: Send + Sync + fmt::Debug {
    /// Split one pre-tokenized piece into vocabulary tokens.
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Exact vocabulary lookup (no unknown-token fallback).
    fn token_to_id(&self, token: &str) -> Option<TokenId>;

    fn id_to_token(&self, id: TokenId) -> Option<&str>;

    fn vocab_size(&self) -> usize;

    fn bos_token(&self) -> Option<&str>;

    fn eos_token(&self) -> Option<&str>;

    fn unknown_token(&self) -> Option<&str>;

    /// Whether runs of unknown tokens collapse into one.
    fn fuse_unknown_tokens(&self) -> bool;

    fn bos_token_id(&self) -> Option<TokenId> {
        self.bos_token().and_then(|t| self.token_to_id(t))
    }

    fn eos_token_id(&self) -> Option<TokenId> {
        self.eos_token().and_then(|t| self.token_to_id(t))
    }

    fn unknown_token_id(&self) -> Option<TokenId> {
        self.unknown_token().and_then(|t| self.token_to_id(t))
    }
}

// ---------------------------------------------------------------------------
// Vocab: shared token and id storage
// ---------------------------------------------------------------------------

/// Bidirectional token table. IDs may be sparse; holes decode to `None`.
#[derive(Debug, Default)]
pub(crate) struct Vocab {
    token_to_id: FxHashMap<String, TokenId>,
    id_to_token: Vec<String>,
}

impl Vocab {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Vocab {
            token_to_id: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            id_to_token: Vec::with_capacity(capacity),
        }
    }

    /// Register `token` under `id`.
    ///
    /// An ID that already has a token keeps it, and a token that already
    /// has an ID keeps that one: added tokens frequently repeat base
    /// vocabulary entries.
    pub(crate) fn insert(&mut self, token: &str, id: TokenId) {
        let slot = id as usize;
        if slot >= self.id_to_token.len() {
            self.id_to_token.resize(slot + 1, String::new());
        }
        if self.id_to_token[slot].is_empty() {
            self.id_to_token[slot] = token.to_string();
        }
        self.token_to_id.entry(token.to_string()).or_insert(id);
    }

    #[inline]
    pub(crate) fn id(&self, token: &str) -> Option<TokenId> {
        self.token_to_id.get(token).copied()
    }

    #[inline]
    pub(crate) fn token(&self, id: TokenId) -> Option<&str> {
        self.id_to_token
            .get(id as usize)
            .filter(|t| !t.is_empty())
            .map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub(crate) fn extend_added(&mut self, added_tokens: &HashMap<String, TokenId>) {
        for (content, &id) in added_tokens {
            self.insert(content, id);
        }
    }
}

/// Smallest ID range accepted regardless of how few entries declare it.
const MIN_ID_SPAN: usize = 1 << 20;

/// Reject IDs far beyond the number of entries. The ID table is dense, so
/// an absurd ID would otherwise allocate a slot for every ID below it.
pub(crate) fn check_id_span<'a>(
    ids: impl IntoIterator<Item = (&'a str, TokenId)>,
    entries: usize,
) -> Result<()> {
    let limit = entries.saturating_mul(2).max(MIN_ID_SPAN);
    for (token, id) in ids {
        if id as usize >= limit {
            return Err(TokenizerError::MalformedVocab(format!(
                "id {id} for token {token:?} is out of range for {entries} entries"
            )));
        }
    }
    Ok(())
}

/// Parse a `{"token": id, ...}` vocabulary object.
pub(crate) fn parse_vocab_map(model: &Value) -> Result<HashMap<String, TokenId>> {
    let entries = model
        .get("vocab")
        .and_then(Value::as_object)
        .ok_or(TokenizerError::MissingVocab)?;
    let vocab = entries
        .iter()
        .map(|(token, id)| {
            id.as_u64()
                .and_then(|id| TokenId::try_from(id).ok())
                .map(|id| (token.clone(), id))
                .ok_or_else(|| {
                    TokenizerError::MalformedVocab(format!("bad id for token {token:?}: {id}"))
                })
        })
        .collect::<Result<HashMap<_, _>>>()?;
    check_id_span(vocab.iter().map(|(t, &id)| (t.as_str(), id)), vocab.len())?;
    Ok(vocab)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The subword algorithm a tokenizer class resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Bpe,
    WordPiece,
    Unigram,
    /// Generic class: the algorithm is read from `model.type`.
    FromData,
}

/// Strip the `Fast` marker so slow and fast classes share an entry.
pub fn normalize_class_name(class_name: &str) -> &str {
    class_name.strip_suffix("Fast").unwrap_or(class_name)
}

/// Registered tokenizer classes. `class_name` must already be normalized.
pub fn lookup(class_name: &str) -> Option<ModelKind> {
    let kind = match class_name {
        "BertTokenizer" | "DistilBertTokenizer" => ModelKind::WordPiece,
        "T5Tokenizer" | "XLMRobertaTokenizer" => ModelKind::Unigram,
        "CodeGenTokenizer" | "CodeLlamaTokenizer" | "CohereTokenizer" | "FalconTokenizer"
        | "GemmaTokenizer" | "GPT2Tokenizer" | "GPTNeoXTokenizer" | "LlamaTokenizer"
        | "Qwen2Tokenizer" | "RobertaTokenizer" | "WhisperTokenizer" => ModelKind::Bpe,
        "PreTrainedTokenizer" => ModelKind::FromData,
        _ => return None,
    };
    Some(kind)
}

/// Select and build the subword model declared by `config`.
///
/// `added_tokens` (content → id) are merged into the model vocabulary so
/// they can be encoded and decoded like any other token.
pub fn resolve_model(
    config: &TokenizerConfig,
    added_tokens: &HashMap<String, TokenId>,
) -> Result<Box<dyn TokenizingModel>> {
    let class_name = config
        .tokenizer_class()
        .ok_or(TokenizerError::MissingTokenizerClassInConfig)?;
    let class_name = normalize_class_name(class_name);
    let kind =
        lookup(class_name).ok_or_else(|| TokenizerError::UnsupportedTokenizer(class_name.into()))?;
    tracing::debug!(class = class_name, ?kind, "resolved tokenizer model");
    check_id_span(
        added_tokens.iter().map(|(t, &id)| (t.as_str(), id)),
        added_tokens.len(),
    )?;
    build_model(kind, config, added_tokens)
}

fn build_model(
    kind: ModelKind,
    config: &TokenizerConfig,
    added_tokens: &HashMap<String, TokenId>,
) -> Result<Box<dyn TokenizingModel>> {
    let model: Box<dyn TokenizingModel> = match kind {
        ModelKind::Bpe => Box::new(BpeModel::from_config(config, added_tokens)?),
        ModelKind::WordPiece => Box::new(WordPieceModel::from_config(config, added_tokens)?),
        ModelKind::Unigram => Box::new(UnigramModel::from_config(config, added_tokens)?),
        ModelKind::FromData => {
            let model_type = config
                .model()
                .and_then(|m| m.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("BPE");
            let kind = match model_type {
                "BPE" => ModelKind::Bpe,
                "WordPiece" => ModelKind::WordPiece,
                "Unigram" => ModelKind::Unigram,
                other => return Err(TokenizerError::UnsupportedTokenizer(other.to_string())),
            };
            return build_model(kind, config, added_tokens);
        }
    };
    Ok(model)
}
