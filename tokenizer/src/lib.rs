//! Tokenizers assembled from HuggingFace-style model repositories.
//!
//! A model repository ships two JSON documents: `tokenizer_config.json`
//! (tokenizer class, special tokens, chat template) and `tokenizer.json`
//! (subword model plus the normalizer, pre-tokenizer, post-processor and
//! decoder stages). [`AutoTokenizer`] reads both, resolves the class to a
//! subword model, builds each stage and returns a [`PreTrainedTokenizer`].
//!
//! ```no_run
//! # async fn demo() -> pie_tokenizer::Result<()> {
//! use pie_tokenizer::{AutoTokenizer, Message};
//!
//! let tokenizer = AutoTokenizer::from_folder("models/llama").await?;
//! let ids = tokenizer.encode("Hello, world!");
//! let text = tokenizer.decode(&ids);
//! # let _ = text;
//!
//! let prompt = tokenizer.apply_chat_template(&[Message::user("Hi!")])?;
//! # let _ = prompt;
//! # Ok(())
//! # }
//! ```

pub mod added_tokens;
pub mod auto;
pub mod byte_level;
pub mod chat;
pub mod config;
pub mod decoders;
pub mod error;
pub mod models;
pub mod normalizers;
pub mod pattern;
pub mod post_processors;
pub mod pre_tokenizers;
pub mod repository;
pub mod special_tokens;
pub mod tokenizer;

pub use auto::{AutoTokenizer, TokenizerVariant};
pub use chat::{ChatTemplateOptions, ContextValue, Message, DEFAULT_CHAT_TEMPLATE};
pub use config::{AddedToken, Config, TokenizerConfig};
pub use error::{Result, TokenizerError};
pub use models::{TokenId, TokenizingModel};
#[cfg(feature = "hub")]
pub use repository::HubRepository;
pub use repository::{load_config, ConfigRepository, HubConfig, LocalRepository};
pub use special_tokens::{SpecialToken, SpecialTokenSet};
pub use tokenizer::PreTrainedTokenizer;
