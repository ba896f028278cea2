//! Keyword embedding seam.
//!
//! Production embeddings come from an upstream model; the engine only needs a
//! [`KeywordEmbedder`] that maps keyword text into the shared vector space.
//! [`HashingEmbedder`] is a deterministic feature-hashing stand-in.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::filter::keyword_terms;
use crate::{Error, Result, Vector};

pub trait KeywordEmbedder: Send + Sync {
    /// Output dimensionality
    fn dim(&self) -> usize;

    /// Embed positive keywords, pushing away from negative ones
    fn embed(&self, positive: &str, negative: &str) -> Result<Vector>;
}

/// Feature-hashing embedder: each term adds +1 (positive) or -1 (negative)
/// to one bucket, then the vector is normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dim })
    }

    fn bucket(&self, term: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        (hasher.finish() % self.dim as u64) as usize
    }
}

impl KeywordEmbedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, positive: &str, negative: &str) -> Result<Vector> {
        let mut data = vec![0.0f32; self.dim];
        for term in keyword_terms(positive) {
            data[self.bucket(&term)] += 1.0;
        }
        for term in keyword_terms(negative) {
            data[self.bucket(&term)] -= 1.0;
        }

        let mut vector = Vector::new(data);
        vector.normalize();
        Ok(vector)
    }
}
