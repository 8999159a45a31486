// SPDX-License-Identifier: Apache-2.0

//! Result cache.
//!
//! Completed result sets are cached by query fingerprint so a repeated
//! federated query skips the whole fetch/join pipeline. The engine only
//! speaks the narrow get/put/clear contract; the bundled implementation is
//! a bounded LRU.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::engine::types::Row;

/// Cache contract consulted by the federation engine.
pub trait ResultCache: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<Vec<Row>>;
    fn put(&self, fingerprint: String, rows: Vec<Row>);
    fn clear(&self);
}

/// Default number of cached result sets.
const DEFAULT_CAPACITY: usize = 128;

/// Bounded in-memory LRU result cache.
pub struct LruResultCache {
    entries: Mutex<LruCache<String, Vec<Row>>>,
}

impl LruResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for LruResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ResultCache for LruResultCache {
    fn get(&self, fingerprint: &str) -> Option<Vec<Row>> {
        self.entries.lock().get(fingerprint).cloned()
    }

    fn put(&self, fingerprint: String, rows: Vec<Row>) {
        self.entries.lock().put(fingerprint, rows);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Cache key for a query. Deliberately conservative: only surrounding
/// whitespace is normalized, so no two semantically different statements
/// can collide.
pub fn query_fingerprint(sql: &str) -> String {
    sql.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Value;

    fn rows(n: i64) -> Vec<Row> {
        vec![vec![("id".to_string(), Value::Int(n))].into_iter().collect()]
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = LruResultCache::new(4);
        cache.put("q1".into(), rows(1));
        assert_eq!(cache.get("q1"), Some(rows(1)));
        assert_eq!(cache.get("q2"), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = LruResultCache::new(2);
        cache.put("a".into(), rows(1));
        cache.put("b".into(), rows(2));
        cache.get("a");
        cache.put("c".into(), rows(3));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = LruResultCache::new(4);
        cache.put("a".into(), rows(1));
        cache.clear();
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn fingerprint_trims_only_surrounding_whitespace() {
        assert_eq!(
            query_fingerprint("  SELECT * FROM a.t1  "),
            "SELECT * FROM a.t1"
        );
        assert_ne!(
            query_fingerprint("SELECT 'a b'"),
            query_fingerprint("SELECT 'a  b'")
        );
    }
}
