//! Cache storage boundary and the in-process implementation.
//!
//! The engine only ever talks to [`CacheStore`]; any byte store offering
//! single-key get/set/set-if-absent/delete/expire can back it. No multi-key
//! atomicity is assumed.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::trace;

use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_CACHE_HIT: &str = "trellis_cache_hit_total";
const METRIC_CACHE_MISS: &str = "trellis_cache_miss_total";

#[derive(Debug, Error)]
pub enum CacheError {
    /// Raised by out-of-process backends; the in-memory store never fails.
    #[error("cache backend failure during `{op}`: {message}")]
    Backend { op: &'static str, message: String },
}

/// Result of a no-clobber write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Stored,
    AlreadyExists,
}

impl SetOutcome {
    pub fn stored(self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Key/value byte store shared by every asset.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &CacheKey, value: Bytes) -> Result<(), CacheError>;

    /// Store `value` only when no live entry exists under `key`.
    async fn set_if_absent(&self, key: &CacheKey, value: Bytes)
    -> Result<SetOutcome, CacheError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Attach a time-to-live to an existing entry. Returns `false` when the
    /// key does not exist. A deadline beyond the clock's range never expires.
    async fn expire(&self, key: &CacheKey, ttl: Duration) -> Result<bool, CacheError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-process [`CacheStore`] with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of live keys.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        rw_read(&self.entries, SOURCE, "contains")
            .get(key.as_str())
            .is_some_and(|entry| entry.is_live(Instant::now()))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let found = {
            let guard = rw_read(&self.entries, SOURCE, "get");
            guard.get(key.as_str()).cloned()
        };

        match found {
            Some(entry) if entry.is_live(now) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Ok(Some(entry.value))
            }
            Some(_) => {
                let mut guard = rw_write(&self.entries, SOURCE, "get.evict_expired");
                // A concurrent `set` may have replaced the entry since the read.
                if guard
                    .get(key.as_str())
                    .is_some_and(|entry| !entry.is_live(Instant::now()))
                {
                    guard.remove(key.as_str());
                }
                drop(guard);
                counter!(METRIC_CACHE_MISS).increment(1);
                trace!(key = %key, result = "expired", "Cache entry expired");
                Ok(None)
            }
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: Bytes) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "set").insert(
            key.as_str().to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &CacheKey,
        value: Bytes,
    ) -> Result<SetOutcome, CacheError> {
        let now = Instant::now();
        let mut guard = rw_write(&self.entries, SOURCE, "set_if_absent");
        if guard.get(key.as_str()).is_some_and(|entry| entry.is_live(now)) {
            return Ok(SetOutcome::AlreadyExists);
        }
        guard.insert(
            key.as_str().to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(SetOutcome::Stored)
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "delete").remove(key.as_str());
        Ok(())
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut guard = rw_write(&self.entries, SOURCE, "expire");
        match guard.get_mut(key.as_str()) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
