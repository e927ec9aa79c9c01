//! Benchmarks for encode / decode throughput over the test fixtures.
//!
//! Usage:
//!   cargo bench --bench encode_bench

#[path = "../tests/common/mod.rs"]
mod common;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use common::{bert_config, gpt2_config, llama_config};
use pie_tokenizer::{AutoTokenizer, PreTrainedTokenizer, TokenizerConfig};

const PARAGRAPH: &str = "Hello world! The quick brown fox jumps over the lazy dog, \
    and then it's gone. Ünïcödé façade, 你好世界, 👋🏽 emoji. ";

fn build(config: TokenizerConfig) -> PreTrainedTokenizer {
    AutoTokenizer::from_config(config).unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let tokenizers = [
        ("gpt2", build(gpt2_config())),
        ("llama", build(llama_config(false))),
        ("bert", build(bert_config("BertTokenizerFast"))),
    ];
    let text = PARAGRAPH.repeat(32);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    for (name, tok) in &tokenizers {
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, text| {
            b.iter(|| tok.encode(text));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let tok = build(gpt2_config());
    let ids = tok.encode(&PARAGRAPH.repeat(32));

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_function("gpt2", |b| b.iter(|| tok.decode(&ids)));
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
