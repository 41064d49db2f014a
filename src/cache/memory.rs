/// In-memory TTL store used when Redis is not configured or unreachable
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe string store with per-entry expiry
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live value for `key`; expired entries are dropped on read
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.payload.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    pub fn set(&self, key: &str, payload: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), Duration::from_secs(10));
        assert_eq!(store.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.set("short", "a".into(), Duration::from_secs(1));
        store.set("long", "b".into(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").as_deref(), Some("b"));
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), Duration::from_secs(60));
        assert!(store.delete("k"));
        assert!(!store.delete("k"));
    }
}
