//! In-memory, TTL-bounded result cache.
//!
//! Lives for the process only. Expired entries are treated as absent and
//! dropped lazily on lookup, or in bulk via [`ResultCache::purge_expired`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::types::ResolutionResult;

/// Default time a resolution stays valid.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: ResolutionResult,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct ResultCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    /// A zero `ttl` disables caching entirely.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Live entry for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<ResolutionResult> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.result.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check: another writer may have refreshed it meanwhile.
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
            debug!(key, "Evicted expired cache entry");
        }
        None
    }

    /// Store or overwrite `key`. No-op when caching is disabled.
    pub async fn insert(&self, key: &str, result: ResolutionResult) {
        if !self.is_enabled() {
            return;
        }
        let entry = CacheEntry {
            result,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(url: &str) -> ResolutionResult {
        ResolutionResult::direct(url)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.insert("p:a", direct("https://cdn/a.mp4")).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("p:a").await.unwrap().url, "https://cdn/a.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_evicted_on_get() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.insert("p:a", direct("https://cdn/a.mp4")).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.get("p:a").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_expiry() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.insert("p:a", direct("old")).await;
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.insert("p:a", direct("new")).await;
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.get("p:a").await.unwrap().url, "new");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResultCache::new(Duration::from_secs(10));
        cache.insert("p:a", direct("a")).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert("p:b", direct("b")).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("p:b").await.is_some());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables() {
        let cache = ResultCache::new(Duration::ZERO);
        assert!(!cache.is_enabled());
        cache.insert("p:a", direct("a")).await;
        assert!(cache.get("p:a").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_miss() {
        let cache = ResultCache::default();
        assert_eq!(cache.ttl(), DEFAULT_TTL);
        assert!(cache.get("nope").await.is_none());
    }
}
