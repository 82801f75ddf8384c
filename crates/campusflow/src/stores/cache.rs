use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Key/value port over the volatile store holding prospection entries and
/// intake counters. Production deployments back this with a Redis-class
/// server; everything in-tree runs on [`InMemoryCacheStore`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    /// Stores `value`, replacing any previous entry. A `ttl` of `None` keeps
    /// the entry until explicitly deleted.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>)
        -> Result<(), CacheError>;
    /// Returns whether an entry was actually removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
    /// Atomic counter increment; missing keys start at zero.
    async fn increment(&self, key: &str) -> Result<i64, CacheError>;
    /// All live keys starting with `prefix`, in deterministic (sorted) order.
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
    async fn ping(&self) -> Result<(), CacheError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("value at '{key}' is not a counter")]
    NotCounter { key: String },
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn live(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now < deadline,
            None => true,
        }
    }
}

/// Process-local cache with real TTL expiry. Expired entries are dropped
/// lazily on read and scan.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let current = match entries.get(key).filter(|entry| entry.live(now)) {
            Some(entry) => entry
                .value
                .parse::<i64>()
                .map_err(|_| CacheError::NotCounter {
                    key: key.to_string(),
                })?,
            None => 0,
        };
        let next = current + 1;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.live(now));
        Ok(entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let cache = InMemoryCacheStore::new();
        cache
            .put("prospection:a@x.com", "{}".to_string(), None)
            .await
            .expect("put succeeds");
        assert_eq!(
            cache.get("prospection:a@x.com").await.expect("get"),
            Some("{}".to_string())
        );
        assert!(cache.delete("prospection:a@x.com").await.expect("delete"));
        assert_eq!(cache.get("prospection:a@x.com").await.expect("get"), None);
        assert!(!cache.delete("prospection:a@x.com").await.expect("delete"));
    }

    #[tokio::test]
    async fn expired_entries_vanish_from_get_and_scan() {
        let cache = InMemoryCacheStore::new();
        cache
            .put(
                "prospection:a@x.com",
                "{}".to_string(),
                Some(Duration::from_millis(20)),
            )
            .await
            .expect("put");
        cache
            .put("prospection:b@x.com", "{}".to_string(), None)
            .await
            .expect("put");

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("prospection:a@x.com").await.expect("get"), None);
        let keys = cache.scan_keys("prospection:").await.expect("scan");
        assert_eq!(keys, vec!["prospection:b@x.com".to_string()]);
    }

    #[tokio::test]
    async fn scan_is_prefix_scoped_and_sorted() {
        let cache = InMemoryCacheStore::new();
        for key in ["prospection:c@x.com", "prospection:a@x.com", "counter:prospections"] {
            cache
                .put(key, "1".to_string(), None)
                .await
                .expect("put");
        }

        let keys = cache.scan_keys("prospection:").await.expect("scan");
        assert_eq!(
            keys,
            vec![
                "prospection:a@x.com".to_string(),
                "prospection:c@x.com".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn increment_counts_from_zero_and_rejects_non_counters() {
        let cache = InMemoryCacheStore::new();
        assert_eq!(cache.increment("counter:prospections").await.expect("incr"), 1);
        assert_eq!(cache.increment("counter:prospections").await.expect("incr"), 2);

        cache
            .put("counter:bad", "not-a-number".to_string(), None)
            .await
            .expect("put");
        let err = cache.increment("counter:bad").await.expect_err("rejects");
        assert!(matches!(err, CacheError::NotCounter { .. }));
    }
}
