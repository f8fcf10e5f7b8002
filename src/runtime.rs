//! Inference backend interfaces.
//!
//! The retrieval core never talks to a concrete model runtime. It consumes
//! two seams: [`Embedder`] turns text batches into fixed-width vectors, and
//! [`GraphModel`] exposes a raw run-the-graph primitive (named tensors in,
//! named tensors out) plus tokenizer access, which the query expander and
//! reranker drive directly. Any backend that can satisfy these traits can
//! be plugged in; tests use scripted mocks.

use std::collections::HashMap;

use candle_core::Tensor;

use crate::error::Result;

/// Produces fixed-width embeddings for text batches.
///
/// Implementations must be deterministic for identical input: the embedding
/// job and the vector searcher both rely on vectors being reproducible.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts into one vector each.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Width of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Identifier recorded next to each stored vector.
    fn model_id(&self) -> &str;
}

/// Raw computation-graph execution plus tokenizer access.
///
/// The query expander drives this through a manual prefill-then-decode loop
/// with an externally managed key/value cache; the reranker issues a single
/// batched forward pass. Cache tensors pass through `run` untouched, so the
/// trait stays agnostic to layer count and naming width.
pub trait GraphModel: Send + Sync {
    /// Execute the graph with named input tensors.
    fn run(
        &self,
        inputs: &HashMap<String, Tensor>,
    ) -> Result<HashMap<String, Tensor>>;

    /// Tokenize a single text into ids.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Tokenize a batch with padding; returns `(input_ids, attention_mask)`
    /// tensors of shape `[batch, max_len]`.
    fn encode_batch_padded(&self, texts: &[String]) -> Result<(Tensor, Tensor)>;

    /// Decode token ids back into text.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// The end-of-sequence token id.
    fn eos_token(&self) -> u32;
}

/// Default dimension for [`HashEmbedder`].
pub const HASH_EMBEDDER_DIMENSION: usize = 256;

/// Deterministic FNV-1a n-gram embedder.
///
/// A model-free fallback backend: each word and character trigram hashes
/// into a signed bucket of a fixed-width vector, which is then
/// L2-normalized. Quality is far below a learned model, but it is
/// deterministic, dependency-free and fast, which keeps the vector path
/// and the embedding job usable before a real backend is configured.
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(8);
        Self {
            model_id: format!("hash-fnv1a-{dimension}"),
            dimension,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered.split_whitespace() {
            bump(&mut acc, word.as_bytes());

            let chars: Vec<char> = word.chars().collect();
            for trigram in chars.windows(3) {
                let s: String = trigram.iter().collect();
                bump(&mut acc, s.as_bytes());
            }
        }

        let norm: f32 = acc.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut acc {
                *v /= norm;
            }
        }
        acc
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HASH_EMBEDDER_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn bump(acc: &mut [f32], bytes: &[u8]) {
    let h = fnv1a(bytes);
    let idx = (h % acc.len() as u64) as usize;
    let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
    acc[idx] += sign;
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
