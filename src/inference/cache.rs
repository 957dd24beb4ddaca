//! Model cache
//!
//! In-memory map from model identifier to a loaded model. Entries are never
//! evicted. Loads run outside any map lock; when two callers race on the same
//! cold entry both load, the first insert wins and both receive that instance.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::inference::InferenceError;

pub struct ModelCache<M> {
    entries: DashMap<String, Arc<M>>,
    loads: AtomicUsize,
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<M>> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Return the cached entry or run `load` and cache its result.
    /// Failed loads are not cached.
    pub async fn get_or_load<F, Fut>(&self, name: &str, load: F) -> Result<Arc<M>, InferenceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, InferenceError>>,
    {
        if let Some(model) = self.get(name) {
            return Ok(model);
        }

        let model = Arc::new(load().await?);
        self.loads.fetch_add(1, Ordering::Relaxed);

        let entry = self.entries.entry(name.to_string()).or_insert(model);
        Ok(entry.value().clone())
    }

    /// Number of successful loads performed so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let cache: ModelCache<String> = ModelCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("model-a".to_string())
        };

        let first = cache.get_or_load("a", load).await.unwrap();
        let second = cache.get_or_load("a", load).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.load_count(), 1);
        assert!(cache.contains("a"));
    }

    #[tokio::test]
    async fn test_error_leaves_cache_empty() {
        let cache: ModelCache<String> = ModelCache::new();
        let result = cache
            .get_or_load("bad", || async { Err(InferenceError::Load("nope".to_string())) })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.load_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_loads_converge() {
        let cache: Arc<ModelCache<usize>> = Arc::new(ModelCache::new());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_or_load("m", || async move { Ok(i) }).await })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(*handle.await.unwrap().unwrap());
        }

        // every caller observes whichever instance landed in the map
        let cached = *cache.get("m").unwrap();
        assert!(seen.iter().all(|&v| v == cached));
        assert_eq!(cache.len(), 1);
    }
}
