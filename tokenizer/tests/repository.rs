//! Loading configurations from folders and custom repositories.

mod common;

use std::collections::HashMap;

use common::{gpt2_config, llama_config, write_folder, write_json, LLAMA_BOS};
use pie_tokenizer::{
    load_config, AutoTokenizer, ConfigRepository, LocalRepository, Result, TokenizerError,
};
use serde_json::json;

#[tokio::test]
async fn test_from_folder() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path(), &gpt2_config());

    let tok = AutoTokenizer::from_folder(dir.path()).await.unwrap();
    assert_eq!(tok.encode("Hello world"), vec![259, 264]);
}

#[tokio::test]
async fn test_missing_tokenizer_json() {
    let dir = tempfile::tempdir().unwrap();
    write_json(dir.path(), "tokenizer_config.json", &json!({"tokenizer_class": "GPT2Tokenizer"}));

    let err = AutoTokenizer::from_folder(dir.path()).await.unwrap_err();
    assert!(matches!(err, TokenizerError::MissingConfig));
}

#[tokio::test]
async fn test_missing_tokenizer_config() {
    let dir = tempfile::tempdir().unwrap();
    write_json(dir.path(), "tokenizer.json", gpt2_config().tokenizer_data.as_value());

    let err = AutoTokenizer::from_folder(dir.path()).await.unwrap_err();
    assert!(matches!(err, TokenizerError::MissingConfig));
}

#[tokio::test]
async fn test_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tokenizer_config.json"), b"{not json").unwrap();
    std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

    let err = load_config(&LocalRepository::new(dir.path()), "").await.unwrap_err();
    assert!(matches!(err, TokenizerError::Json(_)));
}

#[tokio::test]
async fn test_chat_template_file_is_merged() {
    let dir = tempfile::tempdir().unwrap();
    let config = gpt2_config();
    write_folder(dir.path(), &config);
    std::fs::write(dir.path().join("chat_template.jinja"), "{{ messages[0].content }}!").unwrap();

    let config = load_config(&LocalRepository::new(dir.path()), "").await.unwrap();
    assert_eq!(config.chat_template(), Some("{{ messages[0].content }}!"));
}

#[tokio::test]
async fn test_inline_chat_template_takes_precedence() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path(), &llama_config(true));
    std::fs::write(dir.path().join("chat_template.jinja"), "ignored").unwrap();

    let config = load_config(&LocalRepository::new(dir.path()), "").await.unwrap();
    assert!(config.chat_template().unwrap().starts_with("{{ bos_token }}"));
}

#[tokio::test]
async fn test_class_inferred_from_model_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = llama_config(true).with_setting("tokenizer_class", None);
    write_folder(dir.path(), &config);
    write_json(dir.path(), "config.json", &json!({"model_type": "mistral"}));

    let tok = AutoTokenizer::from_folder(dir.path()).await.unwrap();
    assert_eq!(tok.config().tokenizer_class(), Some("LlamaTokenizer"));
    assert_eq!(tok.encode("Hello")[0], LLAMA_BOS);
}

#[tokio::test]
async fn test_model_subdirectory() {
    let root = tempfile::tempdir().unwrap();
    let model_dir = root.path().join("org").join("gpt2");
    std::fs::create_dir_all(&model_dir).unwrap();
    write_folder(&model_dir, &gpt2_config());

    let repo = LocalRepository::new(root.path());
    let tok = AutoTokenizer::from_pretrained_with(&repo, "org/gpt2").await.unwrap();
    assert_eq!(tok.decode(&[259, 264]), "Hello world");
}

// ---------------------------------------------------------------------------
// Custom repository
// ---------------------------------------------------------------------------

/// In-memory repository keyed by (model, file).
struct MemoryRepository {
    files: HashMap<(String, String), Vec<u8>>,
}

impl ConfigRepository for MemoryRepository {
    async fn fetch(&self, model: &str, file: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(&(model.to_string(), file.to_string())).cloned())
    }
}

#[tokio::test]
async fn test_custom_repository() {
    let config = gpt2_config();
    let model = "openai-community/gpt2";
    let files = HashMap::from([
        (
            (model.to_string(), "tokenizer_config.json".to_string()),
            serde_json::to_vec(config.tokenizer_config.as_value()).unwrap(),
        ),
        (
            (model.to_string(), "tokenizer.json".to_string()),
            serde_json::to_vec(config.tokenizer_data.as_value()).unwrap(),
        ),
    ]);
    let repo = MemoryRepository { files };

    let tok = AutoTokenizer::from_pretrained_with(&repo, model).await.unwrap();
    assert_eq!(tok.encode("Hello world"), vec![259, 264]);

    let err = AutoTokenizer::from_pretrained_with(&repo, "missing/model").await.unwrap_err();
    assert!(matches!(err, TokenizerError::MissingConfig));
}
