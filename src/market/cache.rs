//! Expiring key/value cache shared across fetch tasks.
//!
//! Locks are held for single slot reads and writes only, never across a
//! network call.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Fresh value only.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        entries.get(key).filter(|e| Instant::now() <= e.expires_at).map(|e| e.value.clone())
    }

    /// Last stored value, expired or not.
    pub fn get_stale(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries.write().insert(key, Entry { value, expires_at });
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drops entries expired for longer than `grace` and reports how many went.
    /// Entries inside the grace window stay readable through [`Self::get_stale`].
    pub fn purge_expired(&self, grace: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at.checked_add(grace).map_or(true, |limit| now <= limit));
        before - entries.len()
    }
}
