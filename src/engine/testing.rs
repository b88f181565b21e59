//! Shared fixtures for engine unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::cache::{CacheStore, MemoryStore, Namespace};

use super::asset::{AssetFactory, RemoteFetch};
use super::error::AssetError;

/// Serves canned bodies; unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct CannedFetch {
    bodies: HashMap<String, Bytes>,
}

impl CannedFetch {
    pub fn with(mut self, url: &str, body: &'static str) -> Self {
        self.bodies
            .insert(url.to_string(), Bytes::from_static(body.as_bytes()));
        self
    }
}

#[async_trait]
impl RemoteFetch for CannedFetch {
    async fn fetch(&self, url: &Url) -> Result<Bytes, AssetError> {
        self.bodies
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| AssetError::remote_status(url.as_str(), 404))
    }
}

pub fn factory() -> AssetFactory {
    factory_with_store(Arc::new(MemoryStore::new()))
}

pub fn factory_with_store(store: Arc<MemoryStore>) -> AssetFactory {
    let store: Arc<dyn CacheStore> = store;
    AssetFactory::new(
        store,
        Arc::new(CannedFetch::default()),
        Namespace::parse("tests::assets"),
    )
}
