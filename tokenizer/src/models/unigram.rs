//! Unigram (SentencePiece) model: Viterbi search for the highest-scoring
//! segmentation under per-piece log probabilities.

use std::collections::HashMap;

use serde_json::Value;

use super::{TokenId, TokenizingModel, Vocab};
use crate::config::TokenizerConfig;
use crate::error::{Result, TokenizerError};

/// Penalty below the lowest piece score given to an unknown char.
const UNK_PENALTY: f64 = 10.0;

#[derive(Debug)]
pub struct UnigramModel {
    vocab: Vocab,
    /// Score per scored piece, indexed by ID. Added tokens beyond this range
    /// never enter the lattice.
    scores: Vec<f64>,
    max_piece_chars: usize,
    unk_id: TokenId,
    unk_score: f64,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

/// Best path ending at a char boundary.
#[derive(Debug, Clone, Copy)]
struct Best {
    score: f64,
    /// Boundary index where the last piece starts.
    start: usize,
    /// `None` marks an unknown single char.
    id: Option<TokenId>,
}

impl UnigramModel {
    pub fn from_config(
        config: &TokenizerConfig,
        added_tokens: &HashMap<String, TokenId>,
    ) -> Result<Self> {
        let model = config.model().ok_or(TokenizerError::MissingVocab)?;
        let entries = model
            .get("vocab")
            .and_then(Value::as_array)
            .ok_or(TokenizerError::MissingVocab)?;

        let mut vocab = Vocab::with_capacity(entries.len());
        let mut scores = Vec::with_capacity(entries.len());
        let mut max_piece_chars = 1;
        for (idx, entry) in entries.iter().enumerate() {
            let (piece, score) = parse_piece(entry).ok_or_else(|| {
                TokenizerError::MalformedVocab(format!("bad unigram entry #{idx}: {entry}"))
            })?;
            vocab.insert(piece, idx as TokenId);
            scores.push(score);
            max_piece_chars = max_piece_chars.max(piece.chars().count());
        }
        vocab.extend_added(added_tokens);

        let unk_id = model
            .get("unk_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| TokenizerError::MalformedVocab("unigram model has no unk_id".into()))?;
        let unk_id = TokenId::try_from(unk_id)
            .ok()
            .filter(|&id| (id as usize) < scores.len())
            .ok_or_else(|| {
                TokenizerError::MalformedVocab(format!("unk_id {unk_id} is out of range"))
            })?;

        let min_score = scores.iter().copied().fold(f64::INFINITY, f64::min);

        Ok(UnigramModel {
            vocab,
            scores,
            max_piece_chars,
            unk_id,
            unk_score: min_score - UNK_PENALTY,
            bos_token: config.bos_token().map(str::to_string),
            eos_token: config.eos_token().map(str::to_string),
        })
    }

    /// Scored lookup; added tokens outside the scored range are ignored.
    fn scored(&self, piece: &str) -> Option<(TokenId, f64)> {
        let id = self.vocab.id(piece)?;
        self.scores.get(id as usize).map(|&score| (id, score))
    }

    /// Viterbi over char boundaries; returns pieces in order.
    fn segment(&self, text: &str) -> Vec<Option<TokenId>> {
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n = bounds.len() - 1;

        let mut best: Vec<Option<Best>> = vec![None; n + 1];
        best[0] = Some(Best {
            score: 0.0,
            start: 0,
            id: None,
        });

        for start in 0..n {
            let Some(base) = best[start].map(|b| b.score) else {
                continue;
            };
            let mut has_single_char = false;
            let longest = self.max_piece_chars.min(n - start);
            for len in 1..=longest {
                let end = start + len;
                let Some((id, score)) = self.scored(&text[bounds[start]..bounds[end]]) else {
                    continue;
                };
                if len == 1 {
                    has_single_char = true;
                }
                relax(&mut best[end], base + score, start, Some(id));
            }
            if !has_single_char {
                relax(&mut best[start + 1], base + self.unk_score, start, None);
            }
        }

        let mut pieces = Vec::new();
        let mut pos = n;
        while pos > 0 {
            let Some(step) = best[pos] else { break };
            pieces.push(step.id);
            pos = step.start;
        }
        pieces.reverse();
        pieces
    }
}

fn relax(slot: &mut Option<Best>, score: f64, start: usize, id: Option<TokenId>) {
    if slot.map_or(true, |b| score > b.score) {
        *slot = Some(Best { score, start, id });
    }
}

fn parse_piece(entry: &Value) -> Option<(&str, f64)> {
    match entry.as_array()?.as_slice() {
        [piece, score] => Some((piece.as_str()?, score.as_f64()?)),
        _ => None,
    }
}

impl TokenizingModel for UnigramModel {
    fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let unk = self.vocab.token(self.unk_id).unwrap_or_default();
        self.segment(text)
            .into_iter()
            .map(|id| match id.and_then(|id| self.vocab.token(id)) {
                Some(token) => token.to_string(),
                None => unk.to_string(),
            })
            .collect()
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
        self.vocab.token(self.unk_id)
    }

    fn unknown_token_id(&self) -> Option<TokenId> {
        Some(self.unk_id)
    }

    fn fuse_unknown_tokens(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_model(vocab: serde_json::Value, unk_id: serde_json::Value) -> Result<UnigramModel> {
        let cfg = TokenizerConfig::from_values(
            json!({"eos_token": "</s>"}),
            json!({"model": {"type": "Unigram", "unk_id": unk_id, "vocab": vocab}}),
        );
        UnigramModel::from_config(&cfg, &HashMap::new())
    }

    fn sample() -> UnigramModel {
        make_model(
            json!([
                ["<unk>", 0.0], ["</s>", 0.0],
                ["▁", -2.0], ["▁he", -3.0], ["llo", -3.0], ["▁hello", -4.0],
                ["h", -5.0], ["e", -5.0], ["l", -5.0], ["o", -5.0],
            ]),
            json!(0),
        )
        .unwrap()
    }

    #[test]
    fn test_viterbi_prefers_best_score() {
        let model = sample();
        // "▁hello" (-4) beats "▁he" + "llo" (-6).
        assert_eq!(model.tokenize("▁hello"), vec!["▁hello"]);
        assert_eq!(model.tokenize("▁hell"), vec!["▁he", "l", "l"]);
    }

    #[test]
    fn test_unknown_chars_map_to_unk() {
        let model = sample();
        assert_eq!(model.tokenize("▁hex"), vec!["▁he", "<unk>"]);
        assert_eq!(model.tokenize("xy"), vec!["<unk>", "<unk>"]);
        assert!(model.fuse_unknown_tokens());
        assert_eq!(model.eos_token_id(), Some(1));
    }

    #[test]
    fn test_unk_id_required() {
        let err = make_model(json!([["<unk>", 0.0]]), json!(null)).unwrap_err();
        assert!(matches!(err, TokenizerError::MalformedVocab(_)));
        let err = make_model(json!([["<unk>", 0.0]]), json!(5)).unwrap_err();
        assert!(matches!(err, TokenizerError::MalformedVocab(_)));
    }

    #[test]
    fn test_malformed_entries() {
        let err = make_model(json!([["<unk>", "high"]]), json!(0)).unwrap_err();
        assert!(matches!(err, TokenizerError::MalformedVocab(_)));
        let err = make_model(json!({"<unk>": 0}), json!(0)).unwrap_err();
        assert!(matches!(err, TokenizerError::MissingVocab));
    }
}
