//! Response cache with per-entry TTL.
//!
//! Expiry is lazy: an entry past its deadline reads as a miss and is only
//! dropped when overwritten, when the optional size cap forces a purge, or
//! when [`ResponseCache::purge_expired`] is called.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// Derive the cache key for a call.
///
/// Object keys inside `params` are sorted, so `{"a":1,"b":2}` and
/// `{"b":2,"a":1}` produce the same key.
pub fn cache_key(method: &str, params: &[Value]) -> String {
    let mut key = String::with_capacity(method.len() + 16);
    key.push_str(method);
    key.push(':');
    key.push('[');
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        write_canonical(param, &mut key);
    }
    key.push(']');
    key
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

/// Thread-safe key → value store with TTL.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: Option<usize>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `max_entries` entries.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(max_entries)),
            max_entries: Some(max_entries),
        }
    }

    /// Returns the cached value if present and not expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    ///
    /// A zero `ttl` stores nothing.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(max) = self.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                entries.retain(|_, entry| entry.is_fresh(now));
                if entries.len() >= max {
                    let soonest = entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.expires_at)
                        .map(|(k, _)| k.clone());
                    if let Some(evicted) = soonest {
                        entries.remove(&evicted);
                    }
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
