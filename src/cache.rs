//! Session result cache.
//!
//! Completed answer outcomes are cached under a content hash of the
//! question and table so a repeated ask returns the stored outcome
//! instead of re-running the pipeline. Entries expire after the
//! configured TTL and the cache is bounded LRU.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::config::CacheConfig;
use crate::types::{AnswerOutcome, Table};

/// Content-hash key identifying one question over one table
pub fn session_key(question: &str, table: &Table) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    hasher.update(b"\n");
    hasher.update(table.render_markdown().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct SessionCache {
    entries: Arc<RwLock<lru::LruCache<String, (AnswerOutcome, Instant)>>>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(RwLock::new(lru::LruCache::new(capacity))),
            ttl: Duration::from_secs(config.ttl_minutes * 60),
        }
    }

    /// Look up a cached outcome; expired entries are dropped on access
    pub async fn get(&self, key: &str) -> Option<AnswerOutcome> {
        let mut cache = self.entries.write().await;
        let expired = match cache.get(key) {
            Some((outcome, stored_at)) => {
                if stored_at.elapsed() < self.ttl {
                    return Some(outcome.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    /// Store an outcome, sweeping out any expired entries first
    pub async fn insert(&self, key: String, outcome: AnswerOutcome) {
        let mut cache = self.entries.write().await;
        let ttl = self.ttl;
        let stale: Vec<String> = cache
            .iter()
            .filter(|(_, (_, stored_at))| stored_at.elapsed() >= ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
        cache.put(key, (outcome, Instant::now()));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
