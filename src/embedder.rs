//! Embedder trait and the built-in deterministic embedder
//!
//! The embedding model is an external collaborator: anything that can map
//! text to fixed-width vectors plugs in through [`Embedder`]. The built-in
//! [`HashEmbedder`] is a deterministic token-hash projection. It needs no
//! model file and no network, which keeps ingestion offline and tests
//! reproducible, at the cost of only capturing lexical overlap.

use anyhow::Result;

/// Dimension of the built-in embedder; matches the 384-dim
/// sentence-transformer family so stores are interchangeable.
pub const EMBEDDING_DIM: usize = 384;

/// Embedding model abstraction
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Get model name/identifier
    fn name(&self) -> &str;
}

/// Deterministic token-hash projection embedder
///
/// Each token hashes to a seed that drives a small PRNG emitting one value
/// per dimension; token vectors are summed and the result L2-normalized.
/// Identical texts always embed identically, and texts sharing tokens land
/// closer in cosine space.
#[derive(Debug, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];

        for token in tokenize(text) {
            let mut state = fnv1a(token.as_bytes());
            for slot in vector.iter_mut() {
                state = xorshift(state);
                // Map the 64-bit state onto [-1, 1]
                *slot += (state as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn name(&self) -> &str {
        "hash-384"
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    // A zero hash would stall the xorshift below
    hash.max(1)
}

fn xorshift(mut x: u64) -> u64 {
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}
