use std::future::ready;

use ragdeck_model::{Embedder, Embedding};

use crate::Error;

const DEFAULT_DIMENSIONS: usize = 64;

/// A deterministic bag-of-words embedder.
///
/// Every lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets. Texts sharing words end up with a positive cosine similarity,
/// which is enough to exercise retrieval without a real model.
#[derive(Clone, Copy, Debug)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    #[inline]
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty());
        for token in tokens {
            let bucket = fnv1a(&token.to_lowercase()) as usize % self.dimensions;
            vector[bucket] += 1.0;
        }
        vector
    }
}

impl Default for HashEmbedder {
    #[inline]
    fn default() -> Self {
        Self::with_dimensions(DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashEmbedder {
    type Error = Error;

    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Embedding, Self::Error>> + Send + 'static
    {
        ready(Ok(self.embed_sync(text)))
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_length_and_deterministic() {
        let embedder = HashEmbedder::with_dimensions(16);
        let a = embedder.embed("Pasta with tomato sauce").await.unwrap();
        let b = embedder.embed("pasta WITH tomato, sauce").await.unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_eq!(a.iter().sum::<f32>(), 4.0);
    }

    #[test]
    fn test_empty_text() {
        let embedding = HashEmbedder::default().embed_sync("  ");
        assert_eq!(embedding.len(), DEFAULT_DIMENSIONS);
        assert!(embedding.iter().all(|v| *v == 0.0));
    }
}
