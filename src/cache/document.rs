//! Rendered document cache.
//!
//! Compiled documents are stored per route so repeated requests for the same
//! route skip `Layout::compile` until the entry expires.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::keys::{Namespace, digest_hex};
use super::store::{CacheError, CacheStore};

#[derive(Clone)]
pub struct DocumentCache {
    store: Arc<dyn CacheStore>,
    namespace: Namespace,
    ttl: Option<Duration>,
}

impl DocumentCache {
    /// `ttl = None` keeps documents until they are invalidated.
    pub fn new(store: Arc<dyn CacheStore>, namespace: Namespace, ttl: Option<Duration>) -> Self {
        Self {
            store,
            namespace,
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub async fn get(&self, route: &str) -> Result<Option<String>, CacheError> {
        let key = self.namespace.key(digest_hex(route));
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        debug!(route, key = %key, result = "hit", "Serving cached document");
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub async fn put(&self, route: &str, document: &str) -> Result<(), CacheError> {
        let key = self.namespace.key(digest_hex(route));
        self.store
            .set(&key, Bytes::copy_from_slice(document.as_bytes()))
            .await?;
        if let Some(ttl) = self.ttl {
            self.store.expire(&key, ttl).await?;
        }
        Ok(())
    }

    pub async fn invalidate(&self, route: &str) -> Result<(), CacheError> {
        let key = self.namespace.key(digest_hex(route));
        self.store.delete(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::store::MemoryStore;
    use super::*;

    fn cache(store: Arc<MemoryStore>, ttl: Option<Duration>) -> DocumentCache {
        DocumentCache::new(store, Namespace::parse("trellis::documents"), ttl)
    }

    #[tokio::test]
    async fn stores_and_invalidates_documents() {
        let store = Arc::new(MemoryStore::new());
        let documents = cache(store.clone(), None);

        documents.put("/about", "<p>about</p>").await.unwrap();
        assert_eq!(
            documents.get("/about").await.unwrap().as_deref(),
            Some("<p>about</p>")
        );
        assert!(documents.get("/other").await.unwrap().is_none());

        documents.invalidate("/about").await.unwrap();
        assert!(documents.get("/about").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_documents_are_not_served() {
        let store = Arc::new(MemoryStore::new());
        let documents = cache(store, Some(Duration::ZERO));

        documents.put("/about", "<p>about</p>").await.unwrap();
        assert!(documents.get("/about").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn maximal_ttl_is_stored_without_expiry() {
        let store = Arc::new(MemoryStore::new());
        let documents = cache(store, Some(Duration::from_secs(u64::MAX)));

        documents.put("/about", "<p>about</p>").await.unwrap();
        assert_eq!(
            documents.get("/about").await.unwrap().as_deref(),
            Some("<p>about</p>")
        );
    }
}
