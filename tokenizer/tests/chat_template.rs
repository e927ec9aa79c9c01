//! Chat-template selection, rendering and truncation.

mod common;

use common::{gpt2_config, llama_config, LLAMA_BOS};
use pie_tokenizer::{AutoTokenizer, ChatTemplateOptions, Message, TokenizerError};
use serde_json::{json, Value};

fn conversation() -> Vec<Message> {
    vec![Message::system("Be brief."), Message::user("Hi!")]
}

#[test]
fn test_default_template_is_chatml() {
    let tok = AutoTokenizer::from_config(gpt2_config()).unwrap();
    let text = tok
        .render_chat(&[Message::user("Hi!")], &ChatTemplateOptions::default())
        .unwrap();
    assert_eq!(text, "<|im_start|>user\nHi!<|im_end|>\n<|im_start|>assistant\n");
}

#[test]
fn test_generation_prompt_toggle() {
    let tok = AutoTokenizer::from_config(gpt2_config()).unwrap();
    let options = ChatTemplateOptions {
        add_generation_prompt: false,
        ..Default::default()
    };
    let text = tok.render_chat(&[Message::user("Hi!")], &options).unwrap();
    assert_eq!(text, "<|im_start|>user\nHi!<|im_end|>\n");
}

#[test]
fn test_configured_template_sees_special_tokens() {
    let tok = AutoTokenizer::from_config(llama_config(true)).unwrap();
    let text = tok
        .render_chat(&conversation(), &ChatTemplateOptions::default())
        .unwrap();
    assert_eq!(text, "<s>[system] Be brief.\n[user] Hi!\n");

    // The template emits `<s>` itself; no second BOS is added.
    let ids = tok.apply_chat_template(&conversation()).unwrap();
    assert_eq!(ids[0], LLAMA_BOS);
    assert_ne!(ids[1], LLAMA_BOS);
}

#[test]
fn test_additional_special_tokens_in_context() {
    let config = gpt2_config().with_setting(
        "additional_special_tokens",
        Some(json!(["<|tool|>", {"content": "<|obs|>", "special": true}])),
    );
    let tok = AutoTokenizer::from_config(config).unwrap();
    let options = ChatTemplateOptions {
        template: Some("{{ additional_special_tokens | join(',') }}".into()),
        ..Default::default()
    };
    assert_eq!(tok.render_chat(&[], &options).unwrap(), "<|tool|>,<|obs|>");
}

#[test]
fn test_explicit_template_wins() {
    let tok = AutoTokenizer::from_config(llama_config(true)).unwrap();
    let options = ChatTemplateOptions {
        template: Some("{% for m in messages %}{{ m.content }}|{% endfor %}".into()),
        ..Default::default()
    };
    assert_eq!(tok.render_chat(&conversation(), &options).unwrap(), "Be brief.|Hi!|");
}

#[test]
fn test_named_template() {
    let config = gpt2_config().with_setting(
        "chat_template",
        Some(json!([
            {"name": "default", "template": "D:{{ messages[0].content }}"},
            {"name": "tool_use", "template": "T:{{ messages[0].content }}"},
        ])),
    );
    let tok = AutoTokenizer::from_config(config).unwrap();
    let render = |template: Option<&str>| {
        let options = ChatTemplateOptions {
            template: template.map(str::to_string),
            ..Default::default()
        };
        tok.render_chat(&[Message::user("x")], &options).unwrap()
    };
    assert_eq!(render(None), "D:x");
    assert_eq!(render(Some("tool_use")), "T:x");
}

#[test]
fn test_raise_exception_surfaces_as_template_error() {
    let config = gpt2_config().with_setting(
        "chat_template",
        Some(Value::from(
            "{% if messages[0].role != 'user' %}{{ raise_exception('first turn must be user') }}{% endif %}ok",
        )),
    );
    let tok = AutoTokenizer::from_config(config).unwrap();
    assert!(tok.apply_chat_template(&[Message::user("x")]).is_ok());
    let err = tok.apply_chat_template(&[Message::assistant("x")]).unwrap_err();
    assert!(matches!(err, TokenizerError::Template(_)));
}

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

fn long_message() -> Vec<Message> {
    // Single chars without merges: one token each.
    vec![Message::user("a".repeat(120))]
}

#[test]
fn test_truncation_to_max_length() {
    let tok = AutoTokenizer::from_config(gpt2_config()).unwrap();
    let full = tok.apply_chat_template(&long_message()).unwrap();
    assert!(full.len() > 100);

    let options = ChatTemplateOptions {
        truncation: true,
        max_length: Some(10),
        ..Default::default()
    };
    let truncated = tok.apply_chat_template_with(&long_message(), &options).unwrap();
    assert_eq!(truncated, full[..10]);
}

#[test]
fn test_truncation_respects_model_max_length() {
    let config = gpt2_config().with_setting("model_max_length", Some(json!(5)));
    let tok = AutoTokenizer::from_config(config).unwrap();
    let full = tok.apply_chat_template(&long_message()).unwrap();

    for max_length in [None, Some(10)] {
        let options = ChatTemplateOptions {
            truncation: true,
            max_length,
            ..Default::default()
        };
        let ids = tok.apply_chat_template_with(&long_message(), &options).unwrap();
        assert_eq!(ids, full[..5]);
    }
}

#[test]
fn test_no_truncation_without_flag() {
    let tok = AutoTokenizer::from_config(gpt2_config()).unwrap();
    let options = ChatTemplateOptions {
        max_length: Some(10),
        ..Default::default()
    };
    let ids = tok.apply_chat_template_with(&long_message(), &options).unwrap();
    assert!(ids.len() > 10);
}
