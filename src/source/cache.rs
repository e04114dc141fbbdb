//! In-memory LRU cache of per-language values with TTL.
//! Key: language code. Value: group -> key -> value for that language.
//! Any write to the source store invalidates the whole cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

/// group -> key -> value
pub type LangValues = HashMap<String, HashMap<String, String>>;

struct CacheEntry {
    values: Arc<LangValues>,
    inserted_at: Instant,
}

struct Slots {
    lru: LruCache<String, CacheEntry>,
    /// Bumped on every invalidation.
    generation: u64,
}

pub struct LangCache {
    inner: Mutex<Slots>,
    ttl: Duration,
}

impl LangCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Slots {
                lru: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                generation: 0,
            }),
            ttl,
        }
    }

    /// Look up cached values for a language. Returns None if absent or expired.
    pub fn get(&self, lang: &str) -> Option<Arc<LangValues>> {
        let mut slots = self.inner.lock();
        if let Some(entry) = slots.lru.get(lang) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(Arc::clone(&entry.values));
            }
            slots.lru.pop(lang);
        }
        None
    }

    /// Current invalidation generation. Read it before loading values from
    /// the database and hand it back to [`LangCache::insert`].
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Store values loaded under `generation`. Nothing is stored if the
    /// cache was invalidated since, because the load may predate a write.
    pub fn insert(&self, lang: &str, values: Arc<LangValues>, generation: u64) -> bool {
        let mut slots = self.inner.lock();
        if slots.generation != generation {
            return false;
        }
        slots.lru.put(
            lang.to_string(),
            CacheEntry {
                values,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    pub fn invalidate(&self) {
        let mut slots = self.inner.lock();
        slots.lru.clear();
        slots.generation = slots.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(v: &str) -> Arc<LangValues> {
        let mut group = HashMap::new();
        group.insert("title".to_string(), v.to_string());
        let mut all = HashMap::new();
        all.insert("home".to_string(), group);
        Arc::new(all)
    }

    #[test]
    fn hit_then_invalidate() {
        let cache = LangCache::new(4, Duration::from_secs(60));
        assert!(cache.insert("en", values("Home"), cache.generation()));
        assert_eq!(cache.get("en").unwrap()["home"]["title"], "Home");
        assert!(cache.get("es").is_none());

        cache.invalidate();
        assert!(cache.get("en").is_none());
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = LangCache::new(4, Duration::ZERO);
        cache.insert("en", values("Home"), 0);
        assert!(cache.get("en").is_none());
    }

    #[test]
    fn zero_capacity_still_caches_one_language() {
        let cache = LangCache::new(0, Duration::from_secs(60));
        cache.insert("en", values("Home"), 0);
        cache.insert("es", values("Inicio"), 0);
        assert!(cache.get("en").is_none());
        assert_eq!(cache.get("es").unwrap()["home"]["title"], "Inicio");
    }

    #[test]
    fn load_that_raced_an_invalidation_is_not_stored() {
        let cache = LangCache::new(4, Duration::from_secs(60));
        let before_load = cache.generation();

        // a write lands while the old values are being read
        cache.invalidate();

        assert!(!cache.insert("en", values("stale"), before_load));
        assert!(cache.get("en").is_none());

        assert!(cache.insert("en", values("fresh"), cache.generation()));
        assert_eq!(cache.get("en").unwrap()["home"]["title"], "fresh");
    }
}
