//! Top-level tokenizer: the assembled encode / decode pipeline.
//!
//! The encode path is:
//!   1. the added-token matcher splits the raw input;
//!   2. each ordinary segment is normalized, pre-tokenized and handed to
//!      the subword model piece by piece;
//!   3. runs of unknown tokens are fused when the model asks for it;
//!   4. the post-processor adds structural tokens, and tokens map to IDs.
//!
//! The decode path maps IDs back to token strings, runs the decoder stage,
//! concatenates, and optionally applies the cleanup rules.

use std::collections::{HashMap, HashSet};

use crate::added_tokens::{AddedTokenMatcher, Segment};
use crate::config::TokenizerConfig;
use crate::decoders::{clean_up_tokenization, Decoder};
use crate::error::Result;
use crate::models::{resolve_model, TokenId, TokenizingModel};
use crate::normalizers::Normalizer;
use crate::post_processors::PostProcessor;
use crate::pre_tokenizers::PreTokenizer;
use crate::special_tokens::SpecialTokenSet;

/// A tokenizer assembled from a [`TokenizerConfig`].
///
/// Immutable once built; encoding and decoding never fail.
///
/// # Example
///
/// ```no_run
/// use pie_tokenizer::{PreTrainedTokenizer, TokenizerConfig};
///
/// # fn config() -> TokenizerConfig { unimplemented!() }
/// let tokenizer = PreTrainedTokenizer::new(config()).unwrap();
/// let ids = tokenizer.encode("Hello, world!");
/// let text = tokenizer.decode(&ids);
/// ```
#[derive(Debug)]
pub struct PreTrainedTokenizer {
    config: TokenizerConfig,
    model: Box<dyn TokenizingModel>,

    // Pipeline
    normalizer: Option<Normalizer>,
    pre_tokenizer: Option<PreTokenizer>,
    post_processor: Option<PostProcessor>,
    decoder: Option<Decoder>,

    // Added / special tokens
    matcher: AddedTokenMatcher,
    added_tokens: HashSet<String>,
    special_tokens_map: HashMap<String, TokenId>,
    special_token_ids: HashSet<TokenId>,
    special_tokens: SpecialTokenSet,

    clean_up_tokenization_spaces: bool,
}

impl PreTrainedTokenizer {
    /// Build every stage described by `config`.
    ///
    /// Fails when the tokenizer class is missing or unregistered, or when
    /// the model section or a stage is malformed. Unknown stage types are
    /// skipped and act as the identity.
    pub fn new(config: TokenizerConfig) -> Result<Self> {
        let added = config.added_tokens();
        let added_ids: HashMap<String, TokenId> = added
            .iter()
            .filter_map(|t| t.id.map(|id| (t.content.clone(), id)))
            .collect();

        let model = resolve_model(&config, &added_ids)?;

        let added_tokens: HashSet<String> = added.iter().map(|t| t.content.clone()).collect();
        let normalizer = config.normalizer().map(Normalizer::from_config).transpose()?.flatten();
        let pre_tokenizer = config
            .pre_tokenizer()
            .map(PreTokenizer::from_config)
            .transpose()?
            .flatten();
        let post_processor = config
            .post_processor()
            .map(PostProcessor::from_config)
            .transpose()?
            .flatten();
        let decoder = config
            .decoder()
            .map(|node| Decoder::from_config(node, &added_tokens))
            .transpose()?
            .flatten();

        let special_tokens_map: HashMap<String, TokenId> = added
            .iter()
            .filter(|t| t.special)
            .filter_map(|t| t.id.map(|id| (t.content.clone(), id)))
            .collect();
        let special_token_ids = special_tokens_map.values().copied().collect();
        let special_tokens = SpecialTokenSet::from_config(&config, model.as_ref());
        let clean_up_tokenization_spaces = config.clean_up_tokenization_spaces();

        tracing::debug!(
            class = config.tokenizer_class().unwrap_or_default(),
            vocab = model.vocab_size(),
            added = added_tokens.len(),
            special = special_tokens_map.len(),
            "built tokenizer"
        );

        Ok(PreTrainedTokenizer {
            matcher: AddedTokenMatcher::new(&added),
            config,
            model,
            normalizer,
            pre_tokenizer,
            post_processor,
            decoder,
            added_tokens,
            special_tokens_map,
            special_token_ids,
            special_tokens,
            clean_up_tokenization_spaces,
        })
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Split text into token strings (no structural tokens).
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let tokens: Vec<String> = self
            .matcher
            .split(text)
            .into_iter()
            .enumerate()
            .flat_map(|(i, segment)| match segment {
                Segment::Added(token) if self.added_tokens.contains(token) => {
                    vec![token.to_string()]
                }
                Segment::Added(text) | Segment::Text(text) => self.tokenize_segment(text, i == 0),
            })
            .collect();

        if self.model.fuse_unknown_tokens() {
            fuse_unknown_tokens(tokens, |t| self.is_unknown(t))
        } else {
            tokens
        }
    }

    /// Encode text into token IDs, adding structural tokens.
    ///
    /// # Panics
    ///
    /// Panics if a produced token has no ID and the model has no unknown
    /// token. A well-formed configuration never reaches that state.
    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        self.encode_with(text, true)
    }

    /// Encode text into token IDs.
    ///
    /// # Panics
    ///
    /// See [`encode`](Self::encode).
    pub fn encode_with(&self, text: &str, add_special_tokens: bool) -> Vec<TokenId> {
        let tokens = self.tokenize(text);
        let tokens = match &self.post_processor {
            Some(p) => p.post_process(tokens, add_special_tokens),
            None => tokens,
        };
        tokens
            .iter()
            .map(|t| {
                self.token_to_id(t)
                    .unwrap_or_else(|| panic!("token {t:?} has no id and no unknown token is set"))
            })
            .collect()
    }

    /// Normalize, pre-tokenize and model one ordinary segment.
    fn tokenize_segment(&self, text: &str, first_segment: bool) -> Vec<String> {
        let normalized = match &self.normalizer {
            Some(n) => n.normalize(text),
            None => text.to_string(),
        };
        let pieces = match &self.pre_tokenizer {
            Some(p) => p.pre_tokenize(&normalized, first_segment),
            None if normalized.is_empty() => Vec::new(),
            None => vec![normalized],
        };
        pieces
            .iter()
            .flat_map(|piece| self.model.tokenize(piece))
            .collect()
    }

    fn is_unknown(&self, token: &str) -> bool {
        let unk = self.model.unknown_token_id();
        unk.is_some() && self.token_to_id(token) == unk
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Decode token IDs back into text, keeping special tokens.
    pub fn decode(&self, ids: &[TokenId]) -> String {
        self.decode_with(ids, false)
    }

    /// Decode token IDs back into text.
    ///
    /// IDs outside the vocabulary are dropped. With `skip_special_tokens`,
    /// IDs of special added tokens are dropped too.
    pub fn decode_with(&self, ids: &[TokenId], skip_special_tokens: bool) -> String {
        let tokens: Vec<String> = ids
            .iter()
            .filter(|id| !(skip_special_tokens && self.special_token_ids.contains(id)))
            .filter_map(|&id| self.model.id_to_token(id).map(str::to_string))
            .collect();
        let tokens = match &self.decoder {
            Some(d) => d.decode(tokens),
            None => tokens,
        };
        let text = tokens.concat();
        if self.clean_up_tokenization_spaces {
            clean_up_tokenization(&text)
        } else {
            text
        }
    }

    // -----------------------------------------------------------------------
    // Vocabulary access
    // -----------------------------------------------------------------------

    /// Token → ID, falling back to the unknown token's ID.
    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.model
            .token_to_id(token)
            .or_else(|| self.model.unknown_token_id())
    }

    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.model.id_to_token(id)
    }

    pub fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    pub fn bos_token(&self) -> Option<&str> {
        self.model.bos_token()
    }

    pub fn bos_token_id(&self) -> Option<TokenId> {
        self.model.bos_token_id()
    }

    pub fn eos_token(&self) -> Option<&str> {
        self.model.eos_token()
    }

    pub fn eos_token_id(&self) -> Option<TokenId> {
        self.model.eos_token_id()
    }

    pub fn unknown_token(&self) -> Option<&str> {
        self.model.unknown_token()
    }

    pub fn unknown_token_id(&self) -> Option<TokenId> {
        self.model.unknown_token_id()
    }

    /// Content → ID of every special added token.
    pub fn special_tokens_map(&self) -> &HashMap<String, TokenId> {
        &self.special_tokens_map
    }

    /// The named special-token slots from the settings.
    pub fn special_tokens(&self) -> &SpecialTokenSet {
        &self.special_tokens
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn TokenizingModel {
        self.model.as_ref()
    }
}

/// Collapse each run of consecutive unknown tokens into its first element.
pub fn fuse_unknown_tokens(tokens: Vec<String>, is_unknown: impl Fn(&str) -> bool) -> Vec<String> {
    tokens.into_iter().fold(Vec::new(), |mut fused, token| {
        let continues_run =
            is_unknown(&token) && fused.last().is_some_and(|prev: &String| is_unknown(prev));
        if !continues_run {
            fused.push(token);
        }
        fused
    })
}
