use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use openfinance_core::error::PlatformResult;
use openfinance_core::ports::CachePort;
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// TTL-bounded key/value store (C4). Expiry is absolute and checked lazily on
/// read; there is no wildcard scan, matching the "no wildcard scans" invariant.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CachePort for InMemoryCache {
    async fn get(&self, key: &str) -> PlatformResult<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if entry.expires_at <= Utc::now() {
            entries.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> PlatformResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), Entry { value, expires_at: Utc::now() + ttl });
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> PlatformResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > Utc::now() {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), Entry { value, expires_at: Utc::now() + ttl });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_read_back_as_absent() {
        let cache = InMemoryCache::new();
        cache.put("k", "v".to_string(), Duration::seconds(-1)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_is_exclusive_while_alive() {
        let cache = InMemoryCache::new();
        assert!(cache.set_if_absent("k", "first".to_string(), Duration::seconds(60)).await.unwrap());
        assert!(!cache.set_if_absent("k", "second".to_string(), Duration::seconds(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some("first".to_string()));
    }
}
