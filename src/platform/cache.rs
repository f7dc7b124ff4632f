// platform/cache.rs
// Size- and age-bounded memo cache for platform detection results.

use std::collections::{ HashMap, VecDeque };
use std::sync::Mutex;
use std::time::{ Duration, Instant };

use super::Detection;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Default capacity; oldest-accessed entries are evicted beyond this.
pub const DEFAULT_CAPACITY: usize = 50_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry {
    detection: Detection,
    inserted_at: Instant,
}

struct CacheInner {
    map: HashMap<String, CacheEntry>,
    access_order: VecDeque<String>,
    metrics: CacheMetrics,
}

/// LRU cache with TTL expiry for `Detection` results.
pub struct DetectionCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl DetectionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                access_order: VecDeque::new(),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn get(&self, mint: &str) -> Option<Detection> {
        let mut inner = self.inner.lock().ok()?;

        let expired = match inner.map.get(mint) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => {
                inner.metrics.misses += 1;
                return None;
            }
        };

        if expired {
            inner.map.remove(mint);
            inner.access_order.retain(|k| k != mint);
            inner.metrics.misses += 1;
            return None;
        }

        inner.access_order.retain(|k| k != mint);
        inner.access_order.push_back(mint.to_string());
        inner.metrics.hits += 1;
        inner.map.get(mint).map(|e| e.detection.clone())
    }

    pub fn insert(&self, mint: &str, detection: Detection) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if !inner.map.contains_key(mint) && inner.map.len() >= self.capacity {
            if let Some(oldest) = inner.access_order.pop_front() {
                inner.map.remove(&oldest);
                inner.metrics.evictions += 1;
            }
        }

        inner.access_order.retain(|k| k != mint);
        inner.access_order.push_back(mint.to_string());
        inner.map.insert(
            mint.to_string(),
            CacheEntry {
                detection,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.clear();
            inner.access_order.clear();
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner
            .lock()
            .map(|i| i.metrics)
            .unwrap_or_default()
    }
}
