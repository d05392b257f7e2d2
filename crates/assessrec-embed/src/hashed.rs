use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use assessrec_core::traits::{EmbedMode, EmbeddingBackend};

pub const HASHED_MODEL_NAME: &str = "hashed-tokens";
pub const DEFAULT_HASHED_DIM: usize = 384;

/// Bag-of-tokens embedder: each lowercased alphanumeric token adds a signed
/// weight to one hashed bucket. Deterministic and model-free, so texts that
/// share vocabulary land close together.
pub struct HashedEmbedder { dim: usize }

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }
}

impl Default for HashedEmbedder {
    fn default() -> Self { Self::new(DEFAULT_HASHED_DIM) }
}

impl EmbeddingBackend for HashedEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn max_len(&self) -> usize { usize::MAX }

    fn encode(&self, text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let magnitude = 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            let sign = if (h >> 16) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * magnitude;
        }
        Ok(v)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_case_insensitive() {
        let e = HashedEmbedder::new(64);
        let a = e.encode("Java Developer", EmbedMode::Document).unwrap();
        let b = e.encode("java developer", EmbedMode::Query).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn empty_text_is_all_zeros() {
        let e = HashedEmbedder::new(16);
        assert!(e.encode("  ,. ", EmbedMode::Document).unwrap().iter().all(|x| *x == 0.0));
    }
}
