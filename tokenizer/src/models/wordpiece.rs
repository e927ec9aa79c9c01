//! WordPiece model (BERT family): greedy longest-match-first.

use std::collections::HashMap;

use serde_json::Value;

use super::{parse_vocab_map, TokenId, TokenizingModel, Vocab};
use crate::config::{token_content, TokenizerConfig};
use crate::error::{Result, TokenizerError};

#[derive(Debug)]
pub struct WordPieceModel {
    vocab: Vocab,
    unk_token: String,
    continuing_subword_prefix: String,
    max_input_chars_per_word: usize,
    bos_token: Option<String>,
    eos_token: Option<String>,
    fuse_unk: bool,
}

impl WordPieceModel {
    pub fn from_config(
        config: &TokenizerConfig,
        added_tokens: &HashMap<String, TokenId>,
    ) -> Result<Self> {
        let model = config.model().ok_or(TokenizerError::MissingVocab)?;
        let entries = parse_vocab_map(model)?;

        let mut vocab = Vocab::with_capacity(entries.len());
        for (token, &id) in &entries {
            vocab.insert(token, id);
        }
        vocab.extend_added(added_tokens);

        let unk_token = model
            .get("unk_token")
            .and_then(token_content)
            .or_else(|| config.unk_token())
            .unwrap_or("[UNK]")
            .to_string();

        // BERT configs carry cls/sep rather than bos/eos.
        let settings = &config.tokenizer_config;
        let bos_token = config
            .bos_token()
            .or_else(|| settings.token_content("cls_token"))
            .map(str::to_string);
        let eos_token = config
            .eos_token()
            .or_else(|| settings.token_content("sep_token"))
            .map(str::to_string);

        Ok(WordPieceModel {
            vocab,
            unk_token,
            continuing_subword_prefix: model
                .get("continuing_subword_prefix")
                .and_then(Value::as_str)
                .unwrap_or("##")
                .to_string(),
            max_input_chars_per_word: model
                .get("max_input_chars_per_word")
                .and_then(Value::as_u64)
                .map_or(100, |n| n as usize),
            bos_token,
            eos_token,
            fuse_unk: model.get("fuse_unk").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    /// Split a single whitespace-free word. A word with any unmatchable
    /// remainder becomes one unknown token.
    fn tokenize_word(&self, word: &str, out: &mut Vec<String>) {
        let bounds: Vec<usize> = word
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(word.len()))
            .collect();
        let n_chars = bounds.len() - 1;
        if n_chars > self.max_input_chars_per_word {
            out.push(self.unk_token.clone());
            return;
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < n_chars {
            let mut end = n_chars;
            let mut found = None;
            while end > start {
                let sub = &word[bounds[start]..bounds[end]];
                let candidate = if start > 0 {
                    format!("{}{sub}", self.continuing_subword_prefix)
                } else {
                    sub.to_string()
                };
                if self.vocab.id(&candidate).is_some() {
                    found = Some(candidate);
                    break;
                }
                end -= 1;
            }
            match found {
                Some(piece) => pieces.push(piece),
                None => {
                    out.push(self.unk_token.clone());
                    return;
                }
            }
            start = end;
        }
        out.extend(pieces);
    }
}

impl TokenizingModel for WordPieceModel {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for word in text.split_whitespace() {
            self.tokenize_word(word, &mut out);
        }
        out
    }

    fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.vocab.id(token)
    }

    fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.vocab.token(id)
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn bos_token(&self) -> Option<&str> {
        self.bos_token.as_deref()
    }

    fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    fn unknown_token(&self) -> Option<&str> {
        Some(&self.unk_token)
    }

    fn fuse_unknown_tokens(&self) -> bool {
        self.fuse_unk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_model() -> WordPieceModel {
        let cfg = TokenizerConfig::from_values(
            json!({"cls_token": "[CLS]", "sep_token": "[SEP]"}),
            json!({"model": {
                "type": "WordPiece",
                "unk_token": "[UNK]",
                "vocab": {
                    "[UNK]": 0, "[CLS]": 1, "[SEP]": 2,
                    "un": 3, "##aff": 4, "##able": 5, "play": 6, "##ing": 7,
                },
            }}),
        );
        WordPieceModel::from_config(&cfg, &HashMap::new()).unwrap()
    }

    #[test]
    fn test_greedy_longest_match() {
        let model = make_model();
        assert_eq!(model.tokenize("unaffable"), vec!["un", "##aff", "##able"]);
        assert_eq!(model.tokenize("playing un"), vec!["play", "##ing", "un"]);
    }

    #[test]
    fn test_unmatchable_word_is_one_unknown() {
        let model = make_model();
        assert_eq!(model.tokenize("unxyz play"), vec!["[UNK]", "play"]);
        assert_eq!(model.unknown_token_id(), Some(0));
    }

    #[test]
    fn test_overlong_word_is_unknown() {
        let model = make_model();
        let long = "un".repeat(60);
        assert_eq!(model.tokenize(&long), vec!["[UNK]"]);
    }

    #[test]
    fn test_cls_sep_stand_in_for_bos_eos() {
        let model = make_model();
        assert_eq!(model.bos_token_id(), Some(1));
        assert_eq!(model.eos_token_id(), Some(2));
    }
}
