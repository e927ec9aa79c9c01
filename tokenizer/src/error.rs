//! Error type shared by every construction and loading path.

use thiserror::Error;

/// Failures raised while loading configuration or building a tokenizer.
///
/// Once a [`PreTrainedTokenizer`](crate::PreTrainedTokenizer) exists, encoding
/// and decoding never return these; only chat-template rendering can still
/// fail (with [`TokenizerError::Template`]).
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("tokenizer configuration not found")]
    MissingConfig,

    #[error("tokenizer configuration has no `tokenizer_class`")]
    MissingTokenizerClassInConfig,

    #[error("unsupported tokenizer class: {0}")]
    UnsupportedTokenizer(String),

    #[error("tokenizer model has no vocabulary")]
    MissingVocab,

    #[error("malformed vocabulary: {0}")]
    MalformedVocab(String),

    #[error("inconsistent tokenizer configuration: {0}")]
    MismatchedConfig(String),

    #[error("invalid {kind} configuration: {reason}")]
    InvalidComponent { kind: &'static str, reason: String },

    /// Reserved for length enforcement; no current path raises it.
    #[error("input too long: {0}")]
    TooLong(String),

    #[error("chat template failed to render")]
    Template(#[from] minijinja::Error),

    #[error("invalid JSON")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to fetch {file}: {reason}")]
    Fetch { file: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TokenizerError>;

impl TokenizerError {
    pub(crate) fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        TokenizerError::InvalidComponent {
            kind,
            reason: reason.into(),
        }
    }
}
