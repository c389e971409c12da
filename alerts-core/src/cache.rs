//! In-memory TTL cache.
//!
//! Backed by `DashMap` so concurrent evaluations only contend per shard.
//! Expired entries are evicted lazily on read; `cleanup` exists only to
//! bound memory for keys nobody reads again.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.stored_at + self.ttl
    }
}

/// String-keyed cache with a per-entry time-to-live.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Returns the live value for `key`, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        // The read guard must be dropped before `remove_if` takes the shard lock.
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }

        // Re-checked under the write lock so a concurrent `set` is never evicted.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Stores `value`, replacing any previous entry and restarting its clock.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry { value, stored_at: Instant::now(), ttl };
        self.entries.insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = TtlCache::new();
        cache.set("weather:london", 12.5, Duration::from_millis(100));

        advance(Duration::from_millis(50)).await;
        assert_eq!(cache.get("weather:london"), Some(12.5));

        advance(Duration::from_millis(100)).await;
        assert_eq!(cache.get("weather:london"), None);
        assert_eq!(cache.size(), 0, "expired entry must be evicted on read");
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_resets_clock() {
        let cache = TtlCache::new();
        cache.set("k", "old", Duration::from_millis(100));

        advance(Duration::from_millis(80)).await;
        cache.set("k", "new", Duration::from_millis(100));

        advance(Duration::from_millis(80)).await;
        assert_eq!(cache.get("k"), Some("new"));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_only_expired() {
        let cache = TtlCache::new();
        cache.set("short", 1, Duration::from_millis(10));
        cache.set("long", 2, Duration::from_secs(60));

        advance(Duration::from_millis(20)).await;
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_secs(1));

        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert_eq!(cache.get("k"), None);
    }
}
