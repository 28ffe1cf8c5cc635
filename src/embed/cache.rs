//! LRU cache in front of an embedder
//!
//! Follow-up turns in a session often repeat or rephrase the same question;
//! only exact repeats hit the cache.

use super::{EmbedResult, Embedder};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::debug;

pub struct CachedEmbedder<E> {
    inner: E,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    /// Wrap `inner`; a capacity of 0 disables caching
    pub fn new(inner: E, capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { inner, cache }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    async fn embed_documents(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> EmbedResult<Vec<f32>> {
        let Some(cache) = &self.cache else {
            return self.inner.embed_query(text).await;
        };

        if let Some(hit) = cache.lock().await.get(text) {
            debug!("Embedding cache hit");
            return Ok(hit.clone());
        }

        let vector = self.inner.embed_query(text).await?;
        cache.lock().await.put(text.to_string(), vector.clone());
        Ok(vector)
    }
}
