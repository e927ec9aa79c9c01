//! Named special-token slots (`bos_token`, `eos_token`, ...) resolved
//! against the model vocabulary.

use serde_json::Value;

use crate::config::{token_content, TokenizerConfig};
use crate::models::{TokenId, TokenizingModel};

/// Settings keys that name a single special token.
pub const SPECIAL_TOKEN_ATTRIBUTES: [&str; 7] = [
    "bos_token",
    "eos_token",
    "unk_token",
    "sep_token",
    "pad_token",
    "cls_token",
    "mask_token",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialToken {
    pub content: String,
    /// `None` when the token is not in the vocabulary.
    pub id: Option<TokenId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialTokenSet {
    pub bos: Option<SpecialToken>,
    pub eos: Option<SpecialToken>,
    pub unk: Option<SpecialToken>,
    pub sep: Option<SpecialToken>,
    pub pad: Option<SpecialToken>,
    pub cls: Option<SpecialToken>,
    pub mask: Option<SpecialToken>,
    pub additional: Vec<SpecialToken>,
}

impl SpecialTokenSet {
    /// Read the slots from the settings. `bos`, `eos` and `unk` fall back to
    /// what the model was configured with.
    pub fn from_config(config: &TokenizerConfig, model: &dyn TokenizingModel) -> Self {
        let resolve = |content: &str| SpecialToken {
            content: content.to_string(),
            id: model.token_to_id(content),
        };
        let slot = |key: &str| config.tokenizer_config.token_content(key).map(resolve);

        let additional = config
            .tokenizer_config
            .get("additional_special_tokens")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(token_content).map(resolve).collect())
            .unwrap_or_default();

        SpecialTokenSet {
            bos: slot("bos_token").or_else(|| model.bos_token().map(resolve)),
            eos: slot("eos_token").or_else(|| model.eos_token().map(resolve)),
            unk: slot("unk_token").or_else(|| model.unknown_token().map(resolve)),
            sep: slot("sep_token"),
            pad: slot("pad_token"),
            cls: slot("cls_token"),
            mask: slot("mask_token"),
            additional,
        }
    }

    /// Look a slot up by its settings key (`"pad_token"`, ...).
    pub fn get(&self, attribute: &str) -> Option<&SpecialToken> {
        match attribute {
            "bos_token" => self.bos.as_ref(),
            "eos_token" => self.eos.as_ref(),
            "unk_token" => self.unk.as_ref(),
            "sep_token" => self.sep.as_ref(),
            "pad_token" => self.pad.as_ref(),
            "cls_token" => self.cls.as_ref(),
            "mask_token" => self.mask.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;

    use crate::models::resolve_model;

    #[test]
    fn test_slots_resolve_ids() {
        let config = TokenizerConfig::from_values(
            json!({
                "tokenizer_class": "BertTokenizer",
                "pad_token": "[PAD]",
                "mask_token": {"content": "[MASK]", "lstrip": true},
                "additional_special_tokens": ["[X]", {"content": "[Y]"}],
            }),
            json!({"model": {"type": "WordPiece", "vocab": {
                "[PAD]": 0, "[UNK]": 1, "[MASK]": 2, "[X]": 3,
            }}}),
        );
        let model = resolve_model(&config, &HashMap::new()).unwrap();
        let set = SpecialTokenSet::from_config(&config, model.as_ref());

        assert_eq!(set.pad, Some(SpecialToken { content: "[PAD]".into(), id: Some(0) }));
        assert_eq!(set.get("mask_token").and_then(|t| t.id), Some(2));
        // WordPiece reports its own unknown token.
        assert_eq!(set.unk.as_ref().map(|t| t.content.as_str()), Some("[UNK]"));
        assert_eq!(set.additional.len(), 2);
        assert_eq!(set.additional[1].id, None);
        assert!(set.sep.is_none());
    }
}
