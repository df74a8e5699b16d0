//! Process-local TTL cache.
//!
//! Entries are keyed by a category plus an ordered list of identifier
//! strings; each category carries its own time-to-live. The cache backs the
//! access validator so repeated authorization checks for the same caller and
//! server skip their store lookups within the TTL window.
//!
//! Concurrent misses for the same key are not deduplicated: two handlers
//! racing on an uncached key will both execute the underlying lookup. The
//! key cardinality here is small (servers and caller/server pairs) and the
//! backing queries are point lookups, so a single-flight layer is not worth
//! its complexity. Entries live only in this process; in a multi-instance
//! deployment each instance fills its own cache.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;

/// Cache categories, each with a fixed key prefix and TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    /// Server records looked up by slug.
    Server,
    /// Access-check outcomes keyed by (server id, email).
    ServerAccess,
}

impl CacheCategory {
    /// Stable key prefix for this category.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::ServerAccess => "server_access",
        }
    }
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// TTL cache with per-category expiry and prefix-based bulk invalidation.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    server_ttl: Duration,
    access_ttl: Duration,
}

impl TtlCache {
    /// Create a cache with the given per-category TTLs.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            server_ttl: config.server_ttl(),
            access_ttl: config.access_ttl(),
        }
    }

    /// TTL applied to entries of the given category.
    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Server => self.server_ttl,
            CacheCategory::ServerAccess => self.access_ttl,
        }
    }

    fn key(category: CacheCategory, ids: &[&str]) -> String {
        let mut key = String::from(category.prefix());
        for id in ids {
            key.push(':');
            key.push_str(id);
        }
        key
    }

    /// Look up a raw cached value. Expired entries are removed on read and
    /// never returned.
    pub fn get(&self, category: CacheCategory, ids: &[&str]) -> Option<Value> {
        let key = Self::key(category, ids);
        let now = Instant::now();

        {
            let entries = self.entries.read().expect("cache lock poisoned");
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but is expired; drop it so the map does not grow
        // unboundedly with dead keys.
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if entries.get(&key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(&key);
        }
        None
    }

    /// Look up and deserialize a cached value.
    pub fn get_as<T: DeserializeOwned>(&self, category: CacheCategory, ids: &[&str]) -> Option<T> {
        self.get(category, ids)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Insert a value under (category, ids) with the category's TTL.
    pub fn insert<T: Serialize>(&self, category: CacheCategory, ids: &[&str], value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to serialize cache value: {}", e);
                return;
            }
        };
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl_for(category),
        };
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(Self::key(category, ids), entry);
    }

    /// Remove a single entry.
    pub fn invalidate(&self, category: CacheCategory, ids: &[&str]) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.remove(&Self::key(category, ids));
    }

    /// Remove every entry under a category's key prefix.
    pub fn invalidate_category(&self, category: CacheCategory) {
        let prefix = format!("{}:", category.prefix());
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Remove every entry whose key starts with (category, ids) as a prefix.
    ///
    /// Used to drop all access-check outcomes for one server without
    /// touching other servers in the same category.
    pub fn invalidate_prefix(&self, category: CacheCategory, ids: &[&str]) {
        let mut prefix = Self::key(category, ids);
        prefix.push(':');
        let exact = Self::key(category, ids);
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.retain(|key, _| *key != exact && !key.starts_with(&prefix));
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().expect("cache lock poisoned");
        entries.values().filter(|e| e.expires_at > now).count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
