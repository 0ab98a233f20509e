//! Immutable snapshot holders. Readers clone an `Arc` and never block a refresh; a
//! refresh swaps the whole value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::clustering::Clustering;
use crate::errors::AnalyticsError;

#[derive(Debug)]
pub struct SnapshotCell<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self { inner: RwLock::new(None) }
    }
}

impl<T> SnapshotCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<T>> {
        let guard = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    pub fn store(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.swap(Arc::clone(&value));
        value
    }

    pub fn swap(&self, value: Arc<T>) -> Option<Arc<T>> {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.replace(value)
    }
}

/// Identifies a clustering run: the center fingerprint plus every parameter that changes
/// the partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClusteringKey {
    pub fingerprint: String,
    pub include_inactive: bool,
    pub cluster_count: Option<usize>,
    pub seed: u64,
}

#[derive(Debug)]
struct CachedClustering {
    key: ClusteringKey,
    clustering: Arc<Clustering>,
}

/// Read-through cache of the most recent clustering.
#[derive(Debug, Default)]
pub struct ClusteringCache {
    cell: SnapshotCell<CachedClustering>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClusteringCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(
        &self,
        key: ClusteringKey,
        compute: F,
    ) -> Result<Arc<Clustering>, AnalyticsError>
    where
        F: FnOnce() -> Result<Clustering, AnalyticsError>,
    {
        if let Some(cached) = self.cell.load() {
            if cached.key == key {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(event_name = "analytics.clustering.cache_hit", "reusing cached clustering");
                return Ok(Arc::clone(&cached.clustering));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let clustering = Arc::new(compute()?);
        self.cell.store(CachedClustering { key, clustering: Arc::clone(&clustering) });
        Ok(clustering)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ClusteringCache, ClusteringKey, SnapshotCell};
    use crate::clustering::Clustering;
    use crate::errors::AnalyticsError;

    fn key(fingerprint: &str) -> ClusteringKey {
        ClusteringKey {
            fingerprint: fingerprint.to_string(),
            include_inactive: false,
            cluster_count: None,
            seed: 42,
        }
    }

    #[test]
    fn swap_leaves_existing_readers_untouched() {
        let cell = SnapshotCell::new();
        let first = cell.store(vec![1, 2, 3]);
        let reader = cell.load().expect("loaded");
        cell.store(vec![9]);

        assert_eq!(*reader, vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&first, &reader));
        assert_eq!(*cell.load().expect("reloaded"), vec![9]);
    }

    #[test]
    fn same_key_hits_and_new_key_recomputes() -> Result<(), AnalyticsError> {
        let cache = ClusteringCache::new();
        let first = cache.get_or_compute(key("abc"), || Ok(Clustering::default()))?;
        let second = cache.get_or_compute(key("abc"), || {
            Err(AnalyticsError::InsufficientData("should not recompute".to_string()))
        })?;
        assert!(Arc::ptr_eq(&first, &second));

        let third = cache.get_or_compute(key("def"), || Ok(Clustering::default()))?;
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
        Ok(())
    }

    #[test]
    fn failed_compute_keeps_previous_entry() {
        let cache = ClusteringCache::new();
        let stored =
            cache.get_or_compute(key("abc"), || Ok(Clustering::default())).expect("stored");
        let failed = cache.get_or_compute(key("zzz"), || {
            Err(AnalyticsError::InvalidInput("bad k".to_string()))
        });
        assert!(failed.is_err());

        let again = cache.get_or_compute(key("abc"), || Ok(Clustering::default())).expect("hit");
        assert!(Arc::ptr_eq(&stored, &again));
    }
}
