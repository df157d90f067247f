use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Thread-safe LRU cache of content API results with a time-to-live.
///
/// Entries older than the TTL are treated as misses and dropped on lookup.
#[derive(Clone)]
pub struct ContentCache {
    entries: Arc<Mutex<LruCache<String, CachedResult>>>,
    ttl: Duration,
}

struct CachedResult {
    stored_at: Instant,
    text: String,
}

impl ContentCache {
    /// A zero capacity is bumped to one entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                return Some(entry.text.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn put(&self, key: String, text: String) {
        self.lock().put(
            key,
            CachedResult {
                stored_at: Instant::now(),
                text,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CachedResult>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn fetch_key(url: &str) -> String {
    format!("fetch:{url}")
}

pub fn search_key(query: &str) -> String {
    format!("search:{query}")
}
