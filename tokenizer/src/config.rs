//! Read-only views over `tokenizer_config.json` and `tokenizer.json`.
//!
//! The stage sub-trees (`normalizer`, `pre_tokenizer`, ...) are polymorphic,
//! so both documents stay as `serde_json::Value` and the accessors here pull
//! out the handful of fields the orchestrator itself consumes. Everything
//! else is handed to the stage factories untouched.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// One parsed configuration document.
///
/// JSON `null` is treated the same as a missing key by every accessor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    value: Value,
}

impl Config {
    pub fn new(value: Value) -> Self {
        Config { value }
    }

    pub fn from_slice(json: &[u8]) -> Result<Self> {
        Ok(Config::new(serde_json::from_slice(json)?))
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Field lookup; `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// A token attribute written either as a plain string or as an
    /// added-token object (`{"content": "<s>", ...}`).
    pub fn token_content(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(token_content)
    }

    /// Return a copy with `key` set to `value`, or removed when `value` is
    /// `None`.
    pub fn with(&self, key: &str, value: Option<Value>) -> Config {
        let mut object = match &self.value {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        match value {
            Some(v) => {
                object.insert(key.to_string(), v);
            }
            None => {
                object.remove(key);
            }
        }
        Config::new(Value::Object(object))
    }
}

impl From<Value> for Config {
    fn from(value: Value) -> Self {
        Config::new(value)
    }
}

/// Extract the text of a token attribute (plain string or `{content}`).
pub(crate) fn token_content(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("content").and_then(Value::as_str),
        _ => None,
    }
}

/// The `"type"` field of a pipeline component node.
pub(crate) fn node_type(node: &Value) -> &str {
    node.get("type").and_then(Value::as_str).unwrap_or("")
}

/// Children of a `Sequence` node stored under `key`.
pub(crate) fn sequence_children<'a>(node: &'a Value, key: &str) -> &'a [Value] {
    node.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Added tokens
// ---------------------------------------------------------------------------

/// A vocabulary entry inserted outside the learned subword model.
///
/// Mirrors one element of `tokenizer.json`'s `added_tokens` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddedToken {
    #[serde(default)]
    pub id: Option<u32>,
    pub content: String,
    #[serde(default)]
    pub special: bool,
    /// Absorb whitespace on the left when matching.
    #[serde(default)]
    pub lstrip: bool,
    /// Absorb whitespace on the right when matching.
    #[serde(default)]
    pub rstrip: bool,
    #[serde(default)]
    pub single_word: bool,
    #[serde(default)]
    pub normalized: bool,
}

impl AddedToken {
    pub fn new(id: u32, content: impl Into<String>, special: bool) -> Self {
        AddedToken {
            id: Some(id),
            content: content.into(),
            special,
            lstrip: false,
            rstrip: false,
            single_word: false,
            normalized: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenizerConfig
// ---------------------------------------------------------------------------

/// Immutable snapshot of the two documents a tokenizer is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenizerConfig {
    /// `tokenizer_config.json`: class name, special tokens, chat template.
    pub tokenizer_config: Config,
    /// `tokenizer.json`: model, pipeline stages, added tokens.
    pub tokenizer_data: Config,
}

impl TokenizerConfig {
    pub fn new(tokenizer_config: Config, tokenizer_data: Config) -> Self {
        TokenizerConfig {
            tokenizer_config,
            tokenizer_data,
        }
    }

    pub fn from_values(tokenizer_config: Value, tokenizer_data: Value) -> Self {
        TokenizerConfig::new(tokenizer_config.into(), tokenizer_data.into())
    }

    pub fn tokenizer_class(&self) -> Option<&str> {
        self.tokenizer_config.str("tokenizer_class")
    }

    pub fn unk_token(&self) -> Option<&str> {
        self.tokenizer_config.token_content("unk_token")
    }

    pub fn bos_token(&self) -> Option<&str> {
        self.tokenizer_config.token_content("bos_token")
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.tokenizer_config.token_content("eos_token")
    }

    /// Defaults to `true`, matching `transformers`.
    pub fn clean_up_tokenization_spaces(&self) -> bool {
        self.tokenizer_config
            .bool("clean_up_tokenization_spaces")
            .unwrap_or(true)
    }

    /// Defaults to `true`; only Llama-family tokenizers consult it.
    pub fn legacy(&self) -> bool {
        self.tokenizer_config.bool("legacy").unwrap_or(true)
    }

    /// The configured default chat template.
    ///
    /// `chat_template` is either a single template string or a list of
    /// `{"name", "template"}` objects, in which case the one named
    /// `default` is returned.
    pub fn chat_template(&self) -> Option<&str> {
        match self.tokenizer_config.get("chat_template")? {
            Value::String(s) => Some(s),
            Value::Array(_) => self.named_chat_template("default"),
            _ => None,
        }
    }

    /// Look up a template by name in the list form of `chat_template`.
    pub fn named_chat_template(&self, name: &str) -> Option<&str> {
        self.tokenizer_config
            .get("chat_template")?
            .as_array()?
            .iter()
            .find(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|entry| entry.get("template"))
            .and_then(Value::as_str)
    }

    /// `model_max_length` as a usable integer.
    ///
    /// `transformers` writes `1e30` when a model has no limit; such values
    /// and other non-integral floats are reported as absent.
    pub fn model_max_length(&self) -> Option<usize> {
        let value = self.tokenizer_config.get("model_max_length")?;
        if let Some(n) = value.as_u64() {
            return usize::try_from(n).ok();
        }
        let f = value.as_f64()?;
        if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
            Some(f as usize)
        } else {
            None
        }
    }

    pub fn model(&self) -> Option<&Value> {
        self.tokenizer_data.get("model")
    }

    pub fn normalizer(&self) -> Option<&Value> {
        self.tokenizer_data.get("normalizer")
    }

    pub fn pre_tokenizer(&self) -> Option<&Value> {
        self.tokenizer_data.get("pre_tokenizer")
    }

    pub fn post_processor(&self) -> Option<&Value> {
        self.tokenizer_data.get("post_processor")
    }

    pub fn decoder(&self) -> Option<&Value> {
        self.tokenizer_data.get("decoder")
    }

    /// Parse the `added_tokens` array. Entries that do not deserialize are
    /// skipped with a warning.
    pub fn added_tokens(&self) -> Vec<AddedToken> {
        let Some(entries) = self.tokenizer_data.get("added_tokens").and_then(Value::as_array)
        else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| match AddedToken::deserialize(entry) {
                Ok(token) => Some(token),
                Err(err) => {
                    tracing::warn!(%err, "skipping malformed added token");
                    None
                }
            })
            .collect()
    }

    /// Replace the tokenizer-data field `key` (or remove it with `None`).
    pub fn with_data(&self, key: &str, value: Option<Value>) -> TokenizerConfig {
        TokenizerConfig::new(
            self.tokenizer_config.clone(),
            self.tokenizer_data.with(key, value),
        )
    }

    /// Replace the settings field `key` (or remove it with `None`).
    pub fn with_setting(&self, key: &str, value: Option<Value>) -> TokenizerConfig {
        TokenizerConfig::new(
            self.tokenizer_config.with(key, value),
            self.tokenizer_data.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_content_plain_and_nested() {
        let cfg = Config::new(json!({
            "unk_token": "<unk>",
            "bos_token": {"content": "<s>", "lstrip": false},
            "eos_token": null,
        }));
        assert_eq!(cfg.token_content("unk_token"), Some("<unk>"));
        assert_eq!(cfg.token_content("bos_token"), Some("<s>"));
        assert_eq!(cfg.token_content("eos_token"), None);
        assert_eq!(cfg.token_content("pad_token"), None);
    }

    #[test]
    fn test_model_max_length_ignores_huge_float() {
        let cfg = TokenizerConfig::from_values(json!({"model_max_length": 2048}), json!({}));
        assert_eq!(cfg.model_max_length(), Some(2048));

        let cfg = TokenizerConfig::from_values(
            json!({"model_max_length": 1000000000000000019884624838656.0}),
            json!({}),
        );
        assert_eq!(cfg.model_max_length(), None);
    }

    #[test]
    fn test_chat_template_list_form() {
        let cfg = TokenizerConfig::from_values(
            json!({"chat_template": [
                {"name": "tool_use", "template": "TOOLS"},
                {"name": "default", "template": "DEFAULT"},
            ]}),
            json!({}),
        );
        assert_eq!(cfg.chat_template(), Some("DEFAULT"));
        assert_eq!(cfg.named_chat_template("tool_use"), Some("TOOLS"));
        assert_eq!(cfg.named_chat_template("missing"), None);
    }

    #[test]
    fn test_defaults() {
        let cfg = TokenizerConfig::default();
        assert!(cfg.clean_up_tokenization_spaces());
        assert!(cfg.legacy());
        assert!(cfg.tokenizer_class().is_none());
        assert!(cfg.added_tokens().is_empty());
    }

    #[test]
    fn test_added_tokens_parse_and_skip_malformed() {
        let cfg = TokenizerConfig::from_values(
            json!({}),
            json!({"added_tokens": [
                {"id": 1, "content": "<s>", "special": true, "rstrip": true},
                {"id": 2, "content": 42},
                {"content": "<extra>"},
            ]}),
        );
        let tokens = cfg.added_tokens();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].id, Some(1));
        assert!(tokens[0].special && tokens[0].rstrip && !tokens[0].lstrip);
        assert_eq!(tokens[1].id, None);
        assert_eq!(tokens[1].content, "<extra>");
    }

    #[test]
    fn test_with_data_is_a_copy() {
        let cfg = TokenizerConfig::from_values(json!({}), json!({"normalizer": {"type": "NFC"}}));
        let stripped = cfg.with_data("normalizer", None);
        assert!(stripped.normalizer().is_none());
        assert!(cfg.normalizer().is_some());
    }
}
