//! Chat-template rendering and tokenization.

use std::collections::BTreeMap;

use minijinja::{Environment, ErrorKind};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::TokenId;
use crate::special_tokens::SPECIAL_TOKEN_ATTRIBUTES;
use crate::tokenizer::PreTrainedTokenizer;

/// Used when neither the caller nor the configuration supplies a template.
pub const DEFAULT_CHAT_TEMPLATE: &str = r#"{% for message in messages %}{{'<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n'}}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}"#;

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::new("assistant", content)
    }
}

/// A value visible to templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

impl From<&Message> for ContextValue {
    fn from(message: &Message) -> Self {
        ContextValue::Map(BTreeMap::from([
            ("role".to_string(), ContextValue::Str(message.role.clone())),
            ("content".to_string(), ContextValue::Str(message.content.clone())),
        ]))
    }
}

/// Options for [`PreTrainedTokenizer::apply_chat_template_with`].
#[derive(Debug, Clone)]
pub struct ChatTemplateOptions {
    /// Template text, or the name of a configured template. `None` uses
    /// the configured default.
    pub template: Option<String>,
    pub add_generation_prompt: bool,
    pub truncation: bool,
    pub max_length: Option<usize>,
}

impl Default for ChatTemplateOptions {
    /// Generation prompt on, no truncation.
    fn default() -> Self {
        ChatTemplateOptions {
            template: None,
            add_generation_prompt: true,
            truncation: false,
            max_length: None,
        }
    }
}

/// Truncation cap: the smaller of the caller's and the model's limits,
/// or `encoded_len` when neither is set.
pub fn effective_max_length(
    encoded_len: usize,
    max_length: Option<usize>,
    model_max_length: Option<usize>,
) -> usize {
    let cap = max_length.unwrap_or(encoded_len);
    model_max_length.map_or(cap, |limit| cap.min(limit))
}

/// Render `template` with `context` as its global variables.
pub fn render_chat_template(
    template: &str,
    context: &BTreeMap<String, ContextValue>,
) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_function("raise_exception", raise_exception);
    Ok(env.render_str(template, context)?)
}

fn raise_exception(message: String) -> std::result::Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
}

impl PreTrainedTokenizer {
    /// Render and tokenize `messages` with the default options.
    pub fn apply_chat_template(&self, messages: &[Message]) -> Result<Vec<TokenId>> {
        self.apply_chat_template_with(messages, &ChatTemplateOptions::default())
    }

    /// Render and tokenize `messages`. The rendered text is encoded without
    /// structural tokens; the template is expected to emit them.
    pub fn apply_chat_template_with(
        &self,
        messages: &[Message],
        options: &ChatTemplateOptions,
    ) -> Result<Vec<TokenId>> {
        let rendered = self.render_chat(messages, options)?;
        let mut ids = self.encode_with(&rendered, false);
        if options.truncation {
            let cap = effective_max_length(
                ids.len(),
                options.max_length,
                self.config().model_max_length(),
            );
            ids.truncate(cap);
        }
        Ok(ids)
    }

    /// Render `messages` to text without tokenizing.
    pub fn render_chat(&self, messages: &[Message], options: &ChatTemplateOptions) -> Result<String> {
        let config = self.config();
        let template = match options.template.as_deref() {
            Some(t) => config.named_chat_template(t).unwrap_or(t),
            None => config.chat_template().unwrap_or(DEFAULT_CHAT_TEMPLATE),
        };

        let mut context = BTreeMap::new();
        context.insert(
            "messages".to_string(),
            ContextValue::List(messages.iter().map(ContextValue::from).collect()),
        );
        context.insert(
            "add_generation_prompt".to_string(),
            ContextValue::Bool(options.add_generation_prompt),
        );
        for attr in SPECIAL_TOKEN_ATTRIBUTES {
            if let Some(content) = config.tokenizer_config.token_content(attr) {
                context.insert(attr.to_string(), ContextValue::Str(content.to_string()));
            }
        }
        let extra = &self.special_tokens().additional;
        if !extra.is_empty() {
            let extra = extra
                .iter()
                .map(|t| ContextValue::Str(t.content.clone()))
                .collect();
            context.insert("additional_special_tokens".to_string(), ContextValue::List(extra));
        }

        let rendered = render_chat_template(template, &context)?;
        tracing::trace!(messages = messages.len(), chars = rendered.len(), "rendered chat template");
        Ok(rendered)
    }
}
