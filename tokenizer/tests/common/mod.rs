//! Small but structurally faithful tokenizer configurations.
//!
//! Each fixture mirrors the shape of a real `tokenizer.json` /
//! `tokenizer_config.json` pair with a vocabulary cut down to what the
//! tests need.

#![allow(dead_code)]

use std::path::Path;

use pie_tokenizer::byte_level::char_to_byte;
use pie_tokenizer::TokenizerConfig;
use serde_json::{json, Map, Value};

/// GPT-2 style: byte-level BPE over the full 256-char alphabet.
pub fn gpt2_config() -> TokenizerConfig {
    let mut vocab = Map::new();
    for code in 0u32..0x200 {
        if let Some(c) = char::from_u32(code) {
            if let Some(b) = char_to_byte(c) {
                vocab.insert(c.to_string(), json!(b));
            }
        }
    }
    let merges = [
        "H e", "l l", "He ll", "Hell o", "Ġ w", "o r", "Ġw or", "Ġwor l", "Ġworl d",
    ];
    let mut next_id = 256;
    for merge in merges {
        vocab.insert(merge.replace(' ', ""), json!(next_id));
        next_id += 1;
    }
    vocab.insert("<|endoftext|>".into(), json!(50256));

    TokenizerConfig::from_values(
        json!({
            "tokenizer_class": "GPT2Tokenizer",
            "bos_token": "<|endoftext|>",
            "eos_token": "<|endoftext|>",
            "unk_token": "<|endoftext|>",
            "clean_up_tokenization_spaces": false,
            "model_max_length": 1024,
        }),
        json!({
            "added_tokens": [
                {"id": 50256, "content": "<|endoftext|>", "special": true},
            ],
            "normalizer": null,
            "pre_tokenizer": {"type": "ByteLevel", "add_prefix_space": false, "use_regex": true},
            "post_processor": {"type": "ByteLevel", "trim_offsets": false},
            "decoder": {"type": "ByteLevel"},
            "model": {"type": "BPE", "vocab": vocab, "merges": merges},
        }),
    )
}

pub const LLAMA_BOS: u32 = 1;
pub const LLAMA_HELLO: u32 = 300;
pub const LLAMA_WORLD: u32 = 301;

/// Llama-2 style: SentencePiece BPE with byte fallback and the
/// Prepend/Replace normalizer. `post_processor` is left out so the Llama
/// variant synthesizes it from `add_bos_token`.
pub fn llama_config(legacy: bool) -> TokenizerConfig {
    let mut vocab = Map::new();
    vocab.insert("<unk>".into(), json!(0));
    vocab.insert("<s>".into(), json!(1));
    vocab.insert("</s>".into(), json!(2));
    for b in 0u32..256 {
        vocab.insert(format!("<0x{b:02X}>"), json!(3 + b));
    }
    let pieces = [
        ("▁", 259), ("H", 260), ("e", 261), ("l", 262), ("o", 263), ("w", 264), ("r", 265),
        ("d", 266), ("!", 267), ("ll", 268), ("▁H", 269), ("ell", 270), ("▁Hell", 271),
        ("▁w", 272), ("or", 273), ("▁wor", 274), ("▁worl", 275),
        ("▁Hello", LLAMA_HELLO), ("▁world", LLAMA_WORLD),
    ];
    for (piece, id) in pieces {
        vocab.insert(piece.into(), json!(id));
    }
    let merges = [
        "l l", "▁ H", "e ll", "▁H ell", "▁Hell o", "▁ w", "o r", "▁w or", "▁wor l", "▁worl d",
    ];

    TokenizerConfig::from_values(
        json!({
            "tokenizer_class": "LlamaTokenizerFast",
            "add_bos_token": true,
            "add_eos_token": false,
            "bos_token": {"content": "<s>", "lstrip": false, "rstrip": false},
            "eos_token": {"content": "</s>", "lstrip": false, "rstrip": false},
            "unk_token": {"content": "<unk>", "lstrip": false, "rstrip": false},
            "legacy": legacy,
            "model_max_length": 1000000000000000019884624838656.0,
            "chat_template": "{{ bos_token }}{% for message in messages %}[{{ message['role'] }}] {{ message['content'] }}\n{% endfor %}",
        }),
        json!({
            "added_tokens": [
                {"id": 0, "content": "<unk>", "special": true},
                {"id": 1, "content": "<s>", "special": true},
                {"id": 2, "content": "</s>", "special": true},
            ],
            "normalizer": {
                "type": "Sequence",
                "normalizers": [
                    {"type": "Prepend", "prepend": "▁"},
                    {"type": "Replace", "pattern": {"String": " "}, "content": "▁"},
                ],
            },
            "pre_tokenizer": null,
            "post_processor": null,
            "decoder": {
                "type": "Sequence",
                "decoders": [
                    {"type": "Replace", "pattern": {"String": "▁"}, "content": " "},
                    {"type": "ByteFallback"},
                    {"type": "Fuse"},
                    {"type": "Strip", "content": " ", "start": 1, "stop": 0},
                ],
            },
            "model": {
                "type": "BPE",
                "unk_token": "<unk>",
                "byte_fallback": true,
                "fuse_unk": true,
                "vocab": vocab,
                "merges": merges,
            },
        }),
    )
}

/// BERT style: WordPiece with the BERT normalizer and pre-tokenizer.
pub fn bert_config(class: &str) -> TokenizerConfig {
    TokenizerConfig::from_values(
        json!({
            "tokenizer_class": class,
            "do_lower_case": true,
            "unk_token": "[UNK]",
            "sep_token": "[SEP]",
            "pad_token": "[PAD]",
            "cls_token": "[CLS]",
            "mask_token": "[MASK]",
        }),
        json!({
            "added_tokens": [
                {"id": 0, "content": "[PAD]", "special": true},
                {"id": 100, "content": "[UNK]", "special": true},
                {"id": 101, "content": "[CLS]", "special": true},
                {"id": 102, "content": "[SEP]", "special": true},
                {"id": 103, "content": "[MASK]", "special": true},
            ],
            "normalizer": {"type": "BertNormalizer", "lowercase": true, "clean_text": true},
            "pre_tokenizer": {"type": "BertPreTokenizer"},
            "post_processor": {
                "type": "TemplateProcessing",
                "single": [
                    {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
                    {"Sequence": {"id": "A", "type_id": 0}},
                    {"SpecialToken": {"id": "[SEP]", "type_id": 0}},
                ],
            },
            "decoder": {"type": "WordPiece", "prefix": "##", "cleanup": true},
            "model": {
                "type": "WordPiece",
                "unk_token": "[UNK]",
                "continuing_subword_prefix": "##",
                "max_input_chars_per_word": 100,
                "vocab": {
                    "[PAD]": 0, "[UNK]": 100, "[CLS]": 101, "[SEP]": 102, "[MASK]": 103,
                    "!": 999, ",": 1010, "world": 2088, "##able": 3085, "un": 4895,
                    "hello": 7592, "##aff": 10354,
                },
            },
        }),
    )
}

/// T5 style: Unigram pieces with Metaspace on both ends.
pub fn t5_config() -> TokenizerConfig {
    TokenizerConfig::from_values(
        json!({"tokenizer_class": "T5TokenizerFast", "eos_token": "</s>", "unk_token": "<unk>"}),
        json!({
            "added_tokens": [{"id": 1, "content": "</s>", "special": true}],
            "pre_tokenizer": {"type": "Metaspace", "replacement": "▁", "prepend_scheme": "always"},
            "decoder": {"type": "Metaspace", "replacement": "▁", "prepend_scheme": "always"},
            "post_processor": {"type": "TemplateProcessing", "single": ["$A", "</s>"]},
            "model": {
                "type": "Unigram",
                "unk_id": 2,
                "vocab": [
                    ["<pad>", 0.0], ["</s>", 0.0], ["<unk>", 0.0],
                    ["▁", -2.0], ["▁hello", -3.0], ["▁world", -3.5], ["▁hell", -4.0], ["o", -4.0],
                ],
            },
        }),
    )
}

/// Write a configuration as a model folder.
pub fn write_folder(dir: &Path, config: &TokenizerConfig) {
    write_json(dir, "tokenizer_config.json", config.tokenizer_config.as_value());
    write_json(dir, "tokenizer.json", config.tokenizer_data.as_value());
}

pub fn write_json(dir: &Path, file: &str, value: &Value) {
    std::fs::write(dir.join(file), serde_json::to_vec_pretty(value).unwrap()).unwrap();
}
