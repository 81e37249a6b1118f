use sha2::{Digest, Sha256};
use strand_core::drivers::{DriverError, EmbeddingDriver};

/// Deterministic bag-of-words embedding using the hashing trick.
///
/// Each lowercase alphanumeric token is hashed (SHA-256) into one of
/// `dimensions` buckets with a digest-derived sign; the vector is then
/// L2-normalized. Texts sharing words score a positive cosine similarity.
#[derive(Clone, Copy, Debug)]
pub struct HashEmbeddingDriver {
    dimensions: usize,
}

impl Default for HashEmbeddingDriver {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

impl HashEmbeddingDriver {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl EmbeddingDriver for HashEmbeddingDriver {
    fn name(&self) -> &str {
        "HashEmbeddingDriver"
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, DriverError> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let tokens =
            lowered.split(|ch: char| !ch.is_alphanumeric()).filter(|token| !token.is_empty());
        for token in tokens {
            let hash = token_hash(token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }
}

/// First eight bytes of the token's SHA-256 digest, big-endian.
fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
