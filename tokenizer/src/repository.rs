//! Where configuration documents come from: a local folder or the Hub.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::{Config, TokenizerConfig};
use crate::error::{Result, TokenizerError};

pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CHAT_TEMPLATE_FILE: &str = "chat_template.jinja";
pub const CHAT_TEMPLATE_JSON_FILE: &str = "chat_template.json";
pub const MODEL_CONFIG_FILE: &str = "config.json";

/// A source of model files.
pub trait ConfigRepository: Send + Sync {
    /// Read `file` from `model`. `Ok(None)` means the file does not exist.
    fn fetch(&self, model: &str, file: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;
}

// ---------------------------------------------------------------------------
// Local folder
// ---------------------------------------------------------------------------

/// Model IDs are sub-directories of `root`; the empty ID is `root` itself.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalRepository { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ConfigRepository for LocalRepository {
    async fn fetch(&self, model: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(model).join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Where and how to reach a Hub-compatible file server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub endpoint: String,
    pub revision: String,
    pub token: Option<String>,
}

impl Default for HubConfig {
    /// `HF_ENDPOINT` and `HF_TOKEN` override the public endpoint and the
    /// anonymous access.
    fn default() -> Self {
        HubConfig {
            endpoint: std::env::var("HF_ENDPOINT")
                .unwrap_or_else(|_| "https://huggingface.co".to_string()),
            revision: "main".to_string(),
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

impl HubConfig {
    pub fn file_url(&self, model: &str, file: &str) -> String {
        format!(
            "{}/{model}/resolve/{}/{file}",
            self.endpoint.trim_end_matches('/'),
            self.revision
        )
    }
}

#[cfg(feature = "hub")]
#[derive(Debug, Clone)]
pub struct HubRepository {
    config: HubConfig,
    client: reqwest::Client,
}

#[cfg(feature = "hub")]
impl HubRepository {
    pub fn new(config: HubConfig) -> Self {
        HubRepository {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "hub")]
impl Default for HubRepository {
    fn default() -> Self {
        HubRepository::new(HubConfig::default())
    }
}

#[cfg(feature = "hub")]
impl ConfigRepository for HubRepository {
    async fn fetch(&self, model: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let fetch_err = |reason: String| TokenizerError::Fetch {
            file: format!("{model}/{file}"),
            reason,
        };
        let mut request = self.client.get(self.config.file_url(model, file));
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| fetch_err(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
        tracing::debug!(model, file, bytes = bytes.len(), "fetched from hub");
        Ok(Some(bytes.to_vec()))
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load both documents for `model`, filling gaps from the companion files.
///
/// `tokenizer_config.json` and `tokenizer.json` are required. A chat
/// template shipped as its own file is used when the settings carry none,
/// and a missing `tokenizer_class` is inferred from `config.json`.
pub async fn load_config<R: ConfigRepository>(repo: &R, model: &str) -> Result<TokenizerConfig> {
    let settings = repo
        .fetch(model, TOKENIZER_CONFIG_FILE)
        .await?
        .ok_or(TokenizerError::MissingConfig)?;
    let data = repo
        .fetch(model, TOKENIZER_FILE)
        .await?
        .ok_or(TokenizerError::MissingConfig)?;
    let mut config = TokenizerConfig::new(Config::from_slice(&settings)?, Config::from_slice(&data)?);

    if config.tokenizer_config.get("chat_template").is_none() {
        if let Some(template) = load_chat_template(repo, model).await? {
            config = config.with_setting("chat_template", Some(template));
        }
    }

    if config.tokenizer_class().is_none() {
        if let Some(bytes) = repo.fetch(model, MODEL_CONFIG_FILE).await? {
            let model_config = Config::from_slice(&bytes)?;
            let inferred = model_config.str("model_type").and_then(tokenizer_class_for_model_type);
            if let Some(class) = inferred {
                tracing::debug!(model, class, "inferred tokenizer class");
                config = config.with_setting("tokenizer_class", Some(Value::from(class)));
            }
        }
    }

    tracing::info!(
        model,
        class = config.tokenizer_class().unwrap_or("<none>"),
        "loaded tokenizer configuration"
    );
    Ok(config)
}

async fn load_chat_template<R: ConfigRepository>(repo: &R, model: &str) -> Result<Option<Value>> {
    if let Some(bytes) = repo.fetch(model, CHAT_TEMPLATE_FILE).await? {
        return Ok(Some(Value::String(String::from_utf8_lossy(&bytes).into_owned())));
    }
    if let Some(bytes) = repo.fetch(model, CHAT_TEMPLATE_JSON_FILE).await? {
        return Ok(Config::from_slice(&bytes)?.get("chat_template").cloned());
    }
    Ok(None)
}

/// Tokenizer class for a `config.json` `model_type`.
pub fn tokenizer_class_for_model_type(model_type: &str) -> Option<&'static str> {
    let class = match model_type {
        "llama" | "mistral" | "mixtral" => "LlamaTokenizer",
        "gemma" | "gemma2" => "GemmaTokenizer",
        "gpt2" => "GPT2Tokenizer",
        "gpt_neox" => "GPTNeoXTokenizer",
        "qwen2" => "Qwen2Tokenizer",
        "t5" => "T5Tokenizer",
        "bert" => "BertTokenizer",
        "distilbert" => "DistilBertTokenizer",
        "roberta" => "RobertaTokenizer",
        "xlm-roberta" => "XLMRobertaTokenizer",
        "whisper" => "WhisperTokenizer",
        "falcon" => "FalconTokenizer",
        "cohere" => "CohereTokenizer",
        "codegen" => "CodeGenTokenizer",
        _ => return None,
    };
    Some(class)
}
