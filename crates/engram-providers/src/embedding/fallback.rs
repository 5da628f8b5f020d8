//! Deterministic offline embedding: a hashed bag-of-words projection.
//!
//! No model quality, but stable across processes, which is what tests and
//! air-gapped deployments need. Similar content still lands near itself
//! because shared tokens hash to shared buckets.

use engram_core::errors::EngramResult;
use engram_core::traits::EmbeddingProvider;

pub struct HashEmbeddings {
    dimensions: usize,
}

impl HashEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl EmbeddingProvider for HashEmbeddings {
    fn embed(&self, text: &str) -> EngramResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let bucket = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                % self.dimensions;
            // Second hash byte decides the sign so buckets don't only grow.
            let sign = if bytes[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash-fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let provider = HashEmbeddings::new(64);
        assert_eq!(
            provider.embed("postgres tuning").unwrap(),
            provider.embed("postgres tuning").unwrap()
        );
    }

    #[test]
    fn output_has_configured_dimensions_and_unit_norm() {
        let provider = HashEmbeddings::new(32);
        let v = provider.embed("a few words of content").unwrap();
        assert_eq!(v.len(), 32);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_text_scores_higher_than_unrelated() {
        let provider = HashEmbeddings::new(128);
        let base = provider.embed("postgres index tuning").unwrap();
        let near = provider.embed("postgres index performance").unwrap();
        let far = provider.embed("gardening in spring rain").unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&base, &near) > dot(&base, &far));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let provider = HashEmbeddings::new(16);
        assert!(provider.embed("").unwrap().iter().all(|v| *v == 0.0));
    }
}
