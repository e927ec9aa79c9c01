//! Top-level factory: picks the tokenizer variant for a configuration,
//! applies its overrides, and builds it.

use std::path::Path;

use serde_json::{json, Value};

use crate::config::{node_type, sequence_children, TokenizerConfig};
use crate::error::{Result, TokenizerError};
use crate::models::normalize_class_name;
use crate::repository::{load_config, ConfigRepository, LocalRepository};
use crate::tokenizer::PreTrainedTokenizer;

/// Tokenizer families that rewrite their configuration before assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerVariant {
    Generic,
    /// Honors `legacy = false` and `add_bos_token` / `add_eos_token`.
    Llama,
}

impl TokenizerVariant {
    pub fn for_config(config: &TokenizerConfig) -> Self {
        match config.tokenizer_class().map(normalize_class_name) {
            Some("LlamaTokenizer") => TokenizerVariant::Llama,
            _ => TokenizerVariant::Generic,
        }
    }

    /// Return the configuration this variant actually builds from.
    pub fn prepare(self, config: TokenizerConfig) -> Result<TokenizerConfig> {
        match self {
            TokenizerVariant::Generic => Ok(config),
            TokenizerVariant::Llama => {
                let config = if config.legacy() {
                    config
                } else {
                    tracing::debug!("non-legacy Llama: replacing normalizer with Metaspace");
                    config.with_data("normalizer", None).with_data(
                        "pre_tokenizer",
                        Some(json!({
                            "type": "Metaspace",
                            "replacement": "▁",
                            "add_prefix_space": true,
                            "prepend_scheme": "first",
                        })),
                    )
                };
                with_bos_eos_template(config)
            }
        }
    }
}

/// Synthesize a `TemplateProcessing` post-processor from the
/// `add_bos_token` / `add_eos_token` flags unless one is already present.
fn with_bos_eos_template(config: TokenizerConfig) -> Result<TokenizerConfig> {
    if config.post_processor().is_some_and(has_template_processing) {
        return Ok(config);
    }

    let settings = &config.tokenizer_config;
    let add_bos = settings.bool("add_bos_token").unwrap_or(false);
    let add_eos = settings.bool("add_eos_token").unwrap_or(false);
    let bos = config.bos_token().filter(|_| add_bos);
    let eos = config.eos_token().filter(|_| add_eos);
    if add_bos && bos.is_none() {
        return Err(TokenizerError::MismatchedConfig(
            "add_bos_token is set but bos_token is missing".into(),
        ));
    }
    if add_eos && eos.is_none() {
        return Err(TokenizerError::MismatchedConfig(
            "add_eos_token is set but eos_token is missing".into(),
        ));
    }

    let special = |token: &str, type_id: u32| json!({"SpecialToken": {"id": token, "type_id": type_id}});
    let sequence = |id: &str, type_id: u32| json!({"Sequence": {"id": id, "type_id": type_id}});

    let mut single = Vec::new();
    let mut pair = Vec::new();
    let mut special_tokens = serde_json::Map::new();
    single.extend(bos.map(|t| special(t, 0)));
    single.push(sequence("A", 0));
    single.extend(eos.map(|t| special(t, 0)));
    pair.extend(single.iter().cloned());
    pair.extend(bos.map(|t| special(t, 1)));
    pair.push(sequence("B", 1));
    pair.extend(eos.map(|t| special(t, 1)));
    for token in bos.into_iter().chain(eos) {
        let id = config
            .tokenizer_data
            .get("model")
            .and_then(|m| m.get("vocab"))
            .and_then(|v| v.get(token))
            .cloned()
            .unwrap_or(Value::Null);
        special_tokens.insert(token.to_string(), json!({"id": token, "ids": [id], "tokens": [token]}));
    }

    let processor = json!({
        "type": "TemplateProcessing",
        "single": single,
        "pair": pair,
        "special_tokens": special_tokens,
    });
    Ok(config.with_data("post_processor", Some(processor)))
}

fn has_template_processing(node: &Value) -> bool {
    match node_type(node) {
        "TemplateProcessing" => true,
        "Sequence" => sequence_children(node, "processors")
            .iter()
            .any(has_template_processing),
        _ => false,
    }
}

/// Builds tokenizers from configurations, folders or the Hub.
pub struct AutoTokenizer;

impl AutoTokenizer {
    /// Build from an in-memory configuration.
    pub fn from_config(config: TokenizerConfig) -> Result<PreTrainedTokenizer> {
        let variant = TokenizerVariant::for_config(&config);
        let config = variant.prepare(config)?;
        PreTrainedTokenizer::new(config)
    }

    /// Load `model` from any repository and build it.
    pub async fn from_pretrained_with<R: ConfigRepository>(
        repo: &R,
        model: &str,
    ) -> Result<PreTrainedTokenizer> {
        let config = load_config(repo, model).await?;
        AutoTokenizer::from_config(config)
    }

    /// Load from a folder holding `tokenizer_config.json` and
    /// `tokenizer.json`.
    pub async fn from_folder(path: impl AsRef<Path>) -> Result<PreTrainedTokenizer> {
        let repo = LocalRepository::new(path.as_ref());
        AutoTokenizer::from_pretrained_with(&repo, "").await
    }

    /// Download `model` (e.g. `"meta-llama/Llama-2-7b-hf"`) from the Hub.
    #[cfg(feature = "hub")]
    pub async fn from_pretrained(model: &str) -> Result<PreTrainedTokenizer> {
        let repo = crate::repository::HubRepository::default();
        AutoTokenizer::from_pretrained_with(&repo, model).await
    }
}
