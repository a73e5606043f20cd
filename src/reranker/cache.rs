//! Caching layer for reranker results

use super::{RerankDocument, Reranker};
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Cached reranker that memoizes scores per (scoring text, documents)
pub struct CachedReranker {
    inner: Box<dyn Reranker>,
    cache: Arc<Mutex<Cache>>,
    semaphore: Arc<Semaphore>,
}

struct Cache {
    entries: HashMap<CacheKey, Vec<f32>>,
    order: VecDeque<CacheKey>,
    max_size: usize,
}

type CacheKey = [u8; 32];

impl CachedReranker {
    pub fn new(inner: Box<dyn Reranker>, max_size: usize) -> Self {
        Self {
            inner,
            cache: Arc::new(Mutex::new(Cache {
                entries: HashMap::new(),
                order: VecDeque::new(),
                max_size: max_size.max(1),
            })),
            semaphore: Arc::new(Semaphore::new(4)), // Limit concurrent model calls
        }
    }

    /// The scoring text already carries the conversation context, so a new
    /// answer always produces a new key.
    fn cache_key(query: &str, documents: &[RerankDocument]) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        for doc in documents {
            hasher.update([0u8]);
            hasher.update(doc.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(doc.text.as_bytes());
        }
        hasher.finalize().into()
    }

    /// Insert with FIFO eviction. A key already present (a concurrent miss
    /// finished first) is refreshed in place and not queued twice.
    fn store(&self, key: CacheKey, scores: Vec<f32>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = cache.entries.get_mut(&key) {
            *existing = scores;
            return;
        }
        if cache.entries.len() >= cache.max_size {
            if let Some(oldest) = cache.order.pop_front() {
                cache.entries.remove(&oldest);
            }
        }
        cache.entries.insert(key, scores);
        cache.order.push_back(key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.entries.len()
    }

    fn lookup(&self, key: &CacheKey) -> Option<Vec<f32>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.entries.get(key).cloned()
    }
}

#[async_trait::async_trait]
impl Reranker for CachedReranker {
    async fn rerank(&self, query: &str, documents: &[RerankDocument]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let key = Self::cache_key(query, documents);
        if let Some(scores) = self.lookup(&key) {
            return Ok(scores);
        }

        let _permit = self.semaphore.acquire().await?;

        // Double-check after acquiring permit
        if let Some(scores) = self.lookup(&key) {
            return Ok(scores);
        }

        let scores = self.inner.rerank(query, documents).await?;

        self.store(key, scores.clone());
        Ok(scores)
    }

    fn top_k(&self) -> usize {
        self.inner.top_k()
    }
}
