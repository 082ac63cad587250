//! Fingerprint-keyed TTL cache for retrieval results (spec §4.4).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::model::RetrievalResult;

struct CacheEntry {
    result: RetrievalResult,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct RetrievalCache {
    entries: HashMap<String, CacheEntry>,
}

impl RetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<RetrievalResult> {
        self.entries
            .get(fingerprint)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.result.clone())
    }

    pub fn put(&mut self, fingerprint: String, result: RetrievalResult, ttl_ms: u64, now: DateTime<Utc>) {
        self.entries.insert(
            fingerprint,
            CacheEntry {
                result,
                expires_at: now + chrono::Duration::milliseconds(ttl_ms as i64),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entry_is_not_returned() {
        let mut cache = RetrievalCache::new();
        let t0 = Utc::now();
        cache.put("fp".to_string(), RetrievalResult::empty(), 100, t0);
        assert!(cache.get("fp", t0 + chrono::Duration::milliseconds(50)).is_some());
        assert!(cache.get("fp", t0 + chrono::Duration::milliseconds(200)).is_none());
    }
}
