//! Service embedding index with cosine nearest-neighbour queries.

pub mod http;
pub mod provider;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::domain::service::ServiceId;
use crate::errors::AnalyticsError;

pub use http::HttpEmbeddingProvider;
pub use provider::{embed_with_timeout, EmbeddingProvider, HashingEmbedder};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SimilarService {
    pub service_id: ServiceId,
    pub similarity: f64,
}

/// Builds the provider selected by `embedding.provider`.
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, AnalyticsError> {
    match config.provider {
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        EmbeddingProviderKind::OpenAi | EmbeddingProviderKind::Ollama => {
            Ok(Arc::new(HttpEmbeddingProvider::from_config(config)?))
        }
    }
}

/// Cosine similarity in `[-1, 1]`; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Fixed-dimension store of service vectors. Upserts are idempotent per service id.
#[derive(Clone, Debug, Default)]
pub struct SimilarityIndex {
    dimension: Option<usize>,
    vectors: BTreeMap<ServiceId, Vec<f32>>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension: Some(dimension), vectors: BTreeMap::new() }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, service_id: ServiceId) -> bool {
        self.vectors.contains_key(&service_id)
    }

    pub fn vector(&self, service_id: ServiceId) -> Option<&[f32]> {
        self.vectors.get(&service_id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, &[f32])> {
        self.vectors.iter().map(|(id, vector)| (*id, vector.as_slice()))
    }

    /// The first vector fixes the dimension when none was configured.
    pub fn upsert(
        &mut self,
        service_id: ServiceId,
        vector: Vec<f32>,
    ) -> Result<(), AnalyticsError> {
        if vector.is_empty() {
            return Err(AnalyticsError::InvalidInput(format!(
                "embedding for service {service_id} is empty"
            )));
        }
        match self.dimension {
            Some(dimension) if dimension != vector.len() => {
                return Err(AnalyticsError::InvalidInput(format!(
                    "embedding for service {service_id} has dimension {}, \
                     index expects {dimension}",
                    vector.len()
                )));
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }
        self.vectors.insert(service_id, vector);
        Ok(())
    }

    /// Top `k` stored vectors by cosine similarity to `query`, descending, ties by id.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SimilarService>, AnalyticsError> {
        self.nearest_excluding(query, k, None)
    }

    /// Neighbours of an indexed service, excluding the service itself. Unknown ids yield
    /// an empty result.
    pub fn nearest_to_service(
        &self,
        service_id: ServiceId,
        k: usize,
    ) -> Result<Vec<SimilarService>, AnalyticsError> {
        match self.vectors.get(&service_id) {
            Some(vector) => self.nearest_excluding(vector, k, Some(service_id)),
            None => Ok(Vec::new()),
        }
    }

    fn nearest_excluding(
        &self,
        query: &[f32],
        k: usize,
        exclude: Option<ServiceId>,
    ) -> Result<Vec<SimilarService>, AnalyticsError> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dimension) = self.dimension {
            if dimension != query.len() {
                return Err(AnalyticsError::InvalidInput(format!(
                    "query has dimension {}, index expects {dimension}",
                    query.len()
                )));
            }
        }

        let mut scored: Vec<SimilarService> = self
            .vectors
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, vector)| SimilarService {
                service_id: *id,
                similarity: cosine_similarity(query, vector),
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .similarity
                .partial_cmp(&left.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.service_id.cmp(&right.service_id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, SimilarityIndex};
    use crate::domain::service::ServiceId;

    #[test]
    fn cosine_handles_zero_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) < -0.99);
    }

    #[test]
    fn empty_index_returns_empty_results() {
        let index = SimilarityIndex::new();
        let results = index.nearest(&[1.0, 0.0, 0.0], 5).expect("empty index query");
        assert!(results.is_empty());
    }

    #[test]
    fn nearest_sorts_by_similarity_then_id() {
        let mut index = SimilarityIndex::with_dimension(2);
        index.upsert(ServiceId(3), vec![1.0, 0.0]).expect("upsert");
        index.upsert(ServiceId(1), vec![1.0, 0.0]).expect("upsert");
        index.upsert(ServiceId(2), vec![0.0, 1.0]).expect("upsert");

        let results = index.nearest(&[1.0, 0.1], 3).expect("query");
        let ids: Vec<i64> = results.iter().map(|hit| hit.service_id.0).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn upsert_is_idempotent_and_rejects_dimension_mismatch() {
        let mut index = SimilarityIndex::new();
        index.upsert(ServiceId(1), vec![1.0, 0.0]).expect("first upsert");
        index.upsert(ServiceId(1), vec![0.0, 1.0]).expect("second upsert");
        assert_eq!(index.len(), 1);
        assert_eq!(index.dimension(), Some(2));
        assert!(index.upsert(ServiceId(2), vec![1.0, 0.0, 0.0]).is_err());
        assert!(index.nearest(&[1.0], 1).is_err());
    }

    #[test]
    fn query_by_service_excludes_itself() {
        let mut index = SimilarityIndex::new();
        index.upsert(ServiceId(1), vec![1.0, 0.0]).expect("upsert");
        index.upsert(ServiceId(2), vec![0.9, 0.1]).expect("upsert");

        let results = index.nearest_to_service(ServiceId(1), 5).expect("query");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].service_id, ServiceId(2));
        assert!(index.nearest_to_service(ServiceId(99), 5).expect("unknown").is_empty());
    }
}
