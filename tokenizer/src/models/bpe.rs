//! Byte-pair-encoding model.
//!
//! The merge loop uses a **flat-array doubly-linked list** for O(1) merge
//! operations with O(1) predecessor access.  An adaptive dispatch chooses
//! between linear scan (short pieces) and BinaryHeap (long pieces).
//!
//! `BpeTable` uses *token-ID-pair* merge keys: merges are looked up as
//! `(left_id, right_id) → (rank, merged_id)`, so the inner loop never hashes
//! strings.  Atoms are Unicode chars of the pre-tokenized piece; byte-level
//! vocabularies already arrive as GPT-2 chars from the pre-tokenizer.

use std::collections::HashMap;

use rustc_hash::FxHashMap;
use serde_json::Value;
use smallvec::SmallVec;

use super::{parse_vocab_map, TokenId, TokenizingModel, Vocab};
use crate::config::{token_content, TokenizerConfig};
use crate::error::{Result, TokenizerError};

/// Merge rank (lower = higher priority). Internal to the BPE algorithm.
type Rank = u32;

// ---------------------------------------------------------------------------
// BpeTable
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct BpeTable {
    vocab: Vocab,
    /// Merge lookup: (left_id, right_id) → (rank, merged_id).
    merges: FxHashMap<(TokenId, TokenId), (Rank, TokenId)>,
    /// byte → token_id for `<0xNN>` tokens.
    byte_fallback_ids: [Option<TokenId>; 256],
}

impl BpeTable {
    /// Build from a `tokenizer.json` vocab + merges.
    ///
    /// Merge priority comes from position in the merges array; the first
    /// occurrence of a pair wins.
    pub fn from_vocab_and_merges(
        vocab: &HashMap<String, TokenId>,
        merge_pairs: &[(String, String)],
        continuing_subword_prefix: &str,
    ) -> Self {
        let mut table = Vocab::with_capacity(vocab.len());
        for (token, &id) in vocab {
            table.insert(token, id);
        }

        let mut merges = FxHashMap::default();
        for (idx, (a, b)) in merge_pairs.iter().enumerate() {
            // Lower-level merges produce the unprefixed token ("he", not
            // "##he"), so the right-hand side is looked up without prefix.
            let b_stripped = if !continuing_subword_prefix.is_empty()
                && b != continuing_subword_prefix
            {
                b.strip_prefix(continuing_subword_prefix).unwrap_or(b)
            } else {
                b.as_str()
            };
            let merged = format!("{a}{b_stripped}");

            if let (Some(left_id), Some(right_id), Some(merged_id)) =
                (table.id(a), table.id(b_stripped), table.id(&merged))
            {
                let rank = (idx + 1) as Rank;
                merges.entry((left_id, right_id)).or_insert((rank, merged_id));
            }
        }

        let mut byte_fallback_ids = [None; 256];
        for byte in 0u16..=255 {
            byte_fallback_ids[byte as usize] = table.id(&format!("<0x{byte:02X}>"));
        }

        BpeTable {
            vocab: table,
            merges,
            byte_fallback_ids,
        }
    }

    /// Insert an added token. It never takes part in merges: added tokens
    /// are split out before the model runs.
    pub fn insert(&mut self, token: &str, id: TokenId) {
        self.vocab.insert(token, id);
    }

    #[inline]
    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.vocab.id(token)
    }

    #[inline]
    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.vocab.token(id)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    #[inline]
    fn pair_rank(&self, left: TokenId, right: TokenId) -> Rank {
        self.merges
            .get(&(left, right))
            .map_or(Rank::MAX, |&(r, _)| r)
    }

    #[inline]
    fn pair_merge(&self, left: TokenId, right: TokenId) -> Option<(Rank, TokenId)> {
        self.merges.get(&(left, right)).copied()
    }

    #[inline]
    fn byte_fallback(&self, byte: u8) -> Option<TokenId> {
        self.byte_fallback_ids[byte as usize]
    }
}

// ---------------------------------------------------------------------------
// Core: doubly-linked-list BPE merge (token-ID pair keys)
// ---------------------------------------------------------------------------

/// A node in the flat-array linked list.
///
/// `rank` caches the merge rank of fusing this node with its successor.
struct Node {
    token_id: TokenId,
    rank: Rank,
    prev: u32,
    next: u32,
}

const NONE: u32 = u32::MAX;

/// Short pieces benefit from cache-friendly linear scan; long pieces from
/// O(log n) heap-based min-finding.
fn bpe_merge(initial_ids: &[TokenId], table: &BpeTable) -> SmallVec<[TokenId; 16]> {
    if initial_ids.len() <= 32 {
        bpe_merge_linear(initial_ids, table)
    } else {
        bpe_merge_heap(initial_ids, table)
    }
}

fn build_nodes(ids: &[TokenId]) -> SmallVec<[Node; 32]> {
    let n = ids.len();
    let mut nodes: SmallVec<[Node; 32]> = SmallVec::with_capacity(n);
    for (i, &id) in ids.iter().enumerate() {
        nodes.push(Node {
            token_id: id,
            rank: Rank::MAX,
            prev: if i > 0 { (i - 1) as u32 } else { NONE },
            next: if i + 1 < n { (i + 1) as u32 } else { NONE },
        });
    }
    nodes
}

#[inline]
fn node_rank(nodes: &[Node], i: usize, table: &BpeTable) -> Rank {
    let j = nodes[i].next;
    if j == NONE {
        return Rank::MAX;
    }
    table.pair_rank(nodes[i].token_id, nodes[j as usize].token_id)
}

fn collect_ids(nodes: &[Node]) -> SmallVec<[TokenId; 16]> {
    let mut ids = SmallVec::new();
    let mut cur = 0u32;
    while cur != NONE {
        ids.push(nodes[cur as usize].token_id);
        cur = nodes[cur as usize].next;
    }
    ids
}

/// Merge node `i` with its successor and relink. Returns false when the
/// pair has no merge entry.
fn merge_at(nodes: &mut [Node], i: usize, table: &BpeTable) -> bool {
    let j = nodes[i].next as usize;
    let Some((_, merged_id)) = table.pair_merge(nodes[i].token_id, nodes[j].token_id) else {
        return false;
    };
    nodes[i].token_id = merged_id;

    let j_next = nodes[j].next;
    nodes[i].next = j_next;
    if j_next != NONE {
        nodes[j_next as usize].prev = i as u32;
    }
    nodes[j].rank = Rank::MAX;
    true
}

fn bpe_merge_linear(initial_ids: &[TokenId], table: &BpeTable) -> SmallVec<[TokenId; 16]> {
    let n = initial_ids.len();
    let mut nodes = build_nodes(initial_ids);

    let mut min_rank: (Rank, u32) = (Rank::MAX, NONE);
    for i in 0..n.saturating_sub(1) {
        let rank = node_rank(&nodes, i, table);
        nodes[i].rank = rank;
        if rank < min_rank.0 {
            min_rank = (rank, i as u32);
        }
    }

    while min_rank.0 != Rank::MAX {
        let i = min_rank.1 as usize;
        if !merge_at(&mut nodes, i, table) {
            break;
        }

        nodes[i].rank = node_rank(&nodes, i, table);
        let pred = nodes[i].prev;
        if pred != NONE {
            nodes[pred as usize].rank = node_rank(&nodes, pred as usize, table);
        }

        min_rank = (Rank::MAX, NONE);
        let mut cur = 0u32;
        while cur != NONE {
            if nodes[cur as usize].rank < min_rank.0 {
                min_rank = (nodes[cur as usize].rank, cur);
            }
            cur = nodes[cur as usize].next;
        }
    }

    collect_ids(&nodes)
}

fn bpe_merge_heap(initial_ids: &[TokenId], table: &BpeTable) -> SmallVec<[TokenId; 16]> {
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    let n = initial_ids.len();
    let mut nodes = build_nodes(initial_ids);

    // (rank, node_index); equal ranks resolve leftmost first.
    let mut heap: BinaryHeap<Reverse<(Rank, u32)>> = BinaryHeap::with_capacity(n);
    for i in 0..n.saturating_sub(1) {
        let rank = node_rank(&nodes, i, table);
        nodes[i].rank = rank;
        if rank != Rank::MAX {
            heap.push(Reverse((rank, i as u32)));
        }
    }

    while let Some(Reverse((rank, idx))) = heap.pop() {
        let i = idx as usize;
        // Stale entry.
        if nodes[i].rank != rank || nodes[i].next == NONE {
            continue;
        }
        if !merge_at(&mut nodes, i, table) {
            continue;
        }

        let new_rank = node_rank(&nodes, i, table);
        nodes[i].rank = new_rank;
        if new_rank != Rank::MAX {
            heap.push(Reverse((new_rank, i as u32)));
        }

        let pred = nodes[i].prev;
        if pred != NONE {
            let pred_rank = node_rank(&nodes, pred as usize, table);
            nodes[pred as usize].rank = pred_rank;
            if pred_rank != Rank::MAX {
                heap.push(Reverse((pred_rank, pred)));
            }
        }
    }

    collect_ids(&nodes)
}

// ---------------------------------------------------------------------------
// Piece encoding
// ---------------------------------------------------------------------------

/// Options that decide what happens to chars missing from the vocabulary.
#[derive(Debug, Clone, Copy)]
struct Fallback {
    byte_fallback: bool,
    unk_token_id: Option<TokenId>,
}

/// Encode one piece with char atoms.
fn bpe_encode(piece: &str, table: &BpeTable, fallback: Fallback, out: &mut Vec<TokenId>) {
    if piece.is_empty() {
        return;
    }

    // Fast path: whole piece is a known token.
    if let Some(id) = table.token_to_id(piece) {
        out.push(id);
        return;
    }

    let offsets: SmallVec<[usize; 32]> = piece
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(piece.len()))
        .collect();
    let n_atoms = offsets.len() - 1;

    let mut initial_ids: SmallVec<[TokenId; 32]> = SmallVec::with_capacity(n_atoms);
    for w in offsets.windows(2) {
        // TokenId::MAX marks an atom missing from the vocabulary.
        initial_ids.push(table.token_to_id(&piece[w[0]..w[1]]).unwrap_or(TokenId::MAX));
    }

    // Contiguous runs of resolved atoms are merged; unresolved atoms fall
    // back to byte tokens or the unknown token.
    let mut run_start = 0;
    while run_start < n_atoms {
        if initial_ids[run_start] == TokenId::MAX {
            let span = &piece[offsets[run_start]..offsets[run_start + 1]];
            fallback_into(span, table, fallback, out);
            run_start += 1;
            continue;
        }
        let mut run_end = run_start + 1;
        while run_end < n_atoms && initial_ids[run_end] != TokenId::MAX {
            run_end += 1;
        }
        let run = &initial_ids[run_start..run_end];
        if run.len() == 1 {
            out.push(run[0]);
        } else {
            out.extend_from_slice(&bpe_merge(run, table));
        }
        run_start = run_end;
    }
}

/// Encode an unknown char as `<0xNN>` tokens, or as the unknown token.
fn fallback_into(span: &str, table: &BpeTable, fallback: Fallback, out: &mut Vec<TokenId>) {
    if fallback.byte_fallback {
        let ids: SmallVec<[TokenId; 4]> =
            span.bytes().filter_map(|b| table.byte_fallback(b)).collect();
        if ids.len() == span.len() {
            out.extend_from_slice(&ids);
            return;
        }
    }
    if let Some(id) = fallback.unk_token_id {
        out.push(id);
    }
}

// ---------------------------------------------------------------------------
// BpeModel
// ---------------------------------------------------------------------------

/// BPE subword model (GPT-2, Llama, Qwen2, Gemma, ...).
#[derive(Debug)]
pub struct BpeModel {
    table: BpeTable,
    fallback: Fallback,
    unk_token: Option<String>,
    bos_token: Option<String>,
    eos_token: Option<String>,
    fuse_unk: bool,
}

impl BpeModel {
    pub fn new(table: BpeTable, unk_token: Option<String>) -> Self {
        let unk_token_id = unk_token.as_deref().and_then(|t| table.token_to_id(t));
        BpeModel {
            table,
            fallback: Fallback {
                byte_fallback: false,
                unk_token_id,
            },
            unk_token,
            bos_token: None,
            eos_token: None,
            fuse_unk: false,
        }
    }

    /// Build from the `model` section of `tokenizer.json`.
    pub fn from_config(
        config: &TokenizerConfig,
        added_tokens: &HashMap<String, TokenId>,
    ) -> Result<Self> {
        let model = config.model().ok_or(TokenizerError::MissingVocab)?;
        let vocab = parse_vocab_map(model)?;

        let merge_pairs = match model.get("merges").and_then(Value::as_array) {
            Some(entries) => entries
                .iter()
                .map(parse_merge_entry)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let prefix = model
            .get("continuing_subword_prefix")
            .and_then(Value::as_str)
            .unwrap_or("");

        let mut table = BpeTable::from_vocab_and_merges(&vocab, &merge_pairs, prefix);
        for (content, &id) in added_tokens {
            table.insert(content, id);
        }

        // The settings' unk_token takes precedence over the model's.
        let unk_token = config
            .unk_token()
            .or_else(|| model.get("unk_token").and_then(token_content))
            .map(str::to_string);

        let mut bpe = BpeModel::new(table, unk_token);
        bpe.fallback.byte_fallback = model
            .get("byte_fallback")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        bpe.fuse_unk = model.get("fuse_unk").and_then(Value::as_bool).unwrap_or(false);
        bpe.bos_token = config.bos_token().map(str::to_string);
        bpe.eos_token = config.eos_token().map(str::to_string);

        tracing::debug!(
            vocab = bpe.table.vocab_size(),
            merges = merge_pairs.len(),
            byte_fallback = bpe.fallback.byte_fallback,
            "built BPE model"
        );
        Ok(bpe)
    }

    /// Encode one piece into token IDs.
    pub fn encode_piece(&self, piece: &str, out: &mut Vec<TokenId>) {
        bpe_encode(piece, &self.table, self.fallback, out);
    }
}

impl TokenizingModel for BpeModel {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut ids = Vec::new();
        self.encode_piece(text, &mut ids);
        ids.into_iter()
            .filter_map(|id| self.table.id_to_token(id).map(str::to_string))
            .collect()
    }

    fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.table.token_to_id(token)
    }

    fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.table.id_to_token(id)
    }

    fn vocab_size(&self) -> usize {
        self.table.vocab_size()
    }

    fn bos_token(&self) -> Option<&str> {
        self.bos_token.as_deref()
    }

    fn eos_token(&self) -> Option<&str> {
        self.eos_token.as_deref()
    }

    fn unknown_token(&self) -> Option<&str> {
        self.unk_token.as_deref()
    }

    fn fuse_unknown_tokens(&self) -> bool {
        self.fuse_unk
    }
}

/// Parse a merge entry from the `model.merges` array.
///
/// Two formats exist:
/// - **Legacy**: `"token_a token_b"`, a single space-separated string.
/// - **Tuple**: `["token_a", "token_b"]`, which allows tokens containing
///   spaces.
fn parse_merge_entry(value: &Value) -> Result<(String, String)> {
    let malformed = || TokenizerError::MalformedVocab(format!("bad merge entry: {value}"));
    if let Some(s) = value.as_str() {
        let (a, b) = s.split_once(' ').ok_or_else(malformed)?;
        Ok((a.to_string(), b.to_string()))
    } else if let Some([a, b]) = value.as_array().map(Vec::as_slice) {
        match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => Ok((a.to_string(), b.to_string())),
            _ => Err(malformed()),
        }
    } else {
        Err(malformed())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
