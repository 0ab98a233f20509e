use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::AnalyticsError;

/// Produces one vector per input text. Implementations may perform network I/O; callers
/// bound every call with [`embed_with_timeout`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AnalyticsError>;
}

pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, AnalyticsError> {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let vectors = match tokio::time::timeout(timeout, provider.embed(texts)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                event_name = "analytics.embedding.timeout",
                provider = provider.name(),
                timeout_ms,
                "embedding provider timed out"
            );
            return Err(AnalyticsError::DependencyTimeout {
                dependency: format!("embedding provider `{}`", provider.name()),
                timeout_ms,
            });
        }
    };

    if vectors.len() != texts.len() {
        return Err(AnalyticsError::DependencyError {
            dependency: format!("embedding provider `{}`", provider.name()),
            message: format!("returned {} vectors for {} inputs", vectors.len(), texts.len()),
        });
    }
    Ok(vectors)
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x1000_0000_01b3;
const STOP_WORDS: &[&str] =
    &["a", "an", "and", "for", "in", "of", "on", "or", "the", "to", "with", "by", "at", "is"];

/// Offline bag-of-words embedder: each token is hashed into a signed bucket and the
/// result is L2-normalised. Texts without tokens embed as the zero vector.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let hash = fnv1a_64(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AnalyticsError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
