//! Bounded in-memory cache for image payloads.
//!
//! Keyed by request [`Fingerprint`], bounded by a byte budget rather than an
//! entry count. Eviction is least-recently-used: both hits and inserts count
//! as use. A payload larger than the entire budget is never cached.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use log::debug;

use crate::memsize::Memory;
use crate::request::Fingerprint;

/// Default budget, matching the original 20 MB image cache.
pub fn default_capacity() -> usize {
    20.mib()
}

struct CacheInner {
    entries: HashMap<Fingerprint, Vec<u8>>,
    /// Use order, least recent at the front.
    order: VecDeque<Fingerprint>,
    used_bytes: usize,
}

/// Byte-bounded LRU store for binary payloads.
pub struct ImageCache {
    capacity_bytes: usize,
    inner: Mutex<CacheInner>,
}

impl ImageCache {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                used_bytes: 0,
            }),
        }
    }

    /// Fetch a cached payload, marking it most recently used.
    pub fn get(&self, fingerprint: Fingerprint) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let payload = inner.entries.get(&fingerprint).cloned()?;
        touch(&mut inner.order, fingerprint);
        Some(payload)
    }

    /// Insert a payload, evicting least-recently-used entries until the
    /// budget holds. Oversized payloads are skipped outright.
    pub fn put(&self, fingerprint: Fingerprint, payload: Vec<u8>) {
        if payload.len() > self.capacity_bytes {
            debug!(
                "payload of {} bytes exceeds the {} byte cache budget; not caching",
                payload.len(),
                self.capacity_bytes
            );
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.entries.remove(&fingerprint) {
            inner.used_bytes -= old.len();
            inner.order.retain(|fp| *fp != fingerprint);
        }

        inner.used_bytes += payload.len();
        inner.entries.insert(fingerprint, payload);
        inner.order.push_back(fingerprint);

        while inner.used_bytes > self.capacity_bytes {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                debug!("evicting {} bytes for {oldest:?}", evicted.len());
                inner.used_bytes -= evicted.len();
            }
        }
    }

    /// Bytes currently held.
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().unwrap().used_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn touch(order: &mut VecDeque<Fingerprint>, fingerprint: Fingerprint) {
    order.retain(|fp| *fp != fingerprint);
    order.push_back(fingerprint);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestConfig;

    fn fp(url: &str) -> Fingerprint {
        RequestConfig::get(url).fingerprint()
    }

    #[test]
    fn get_returns_what_was_put() {
        let cache = ImageCache::new(1.kib());
        cache.put(fp("https://img/a"), vec![1, 2, 3]);
        assert_eq!(cache.get(fp("https://img/a")), Some(vec![1, 2, 3]));
        assert_eq!(cache.get(fp("https://img/b")), None);
    }

    #[test]
    fn stays_within_the_byte_budget() {
        let cache = ImageCache::new(100);
        cache.put(fp("https://img/a"), vec![0u8; 60]);
        cache.put(fp("https://img/b"), vec![0u8; 60]);

        // First entry evicted to make room.
        assert!(cache.used_bytes() <= 100);
        assert_eq!(cache.get(fp("https://img/a")), None);
        assert!(cache.get(fp("https://img/b")).is_some());
    }

    #[test]
    fn eviction_is_least_recently_used() {
        let cache = ImageCache::new(100);
        cache.put(fp("https://img/a"), vec![0u8; 40]);
        cache.put(fp("https://img/b"), vec![0u8; 40]);

        // Touch `a` so `b` becomes the eviction candidate.
        assert!(cache.get(fp("https://img/a")).is_some());
        cache.put(fp("https://img/c"), vec![0u8; 40]);

        assert!(cache.get(fp("https://img/a")).is_some());
        assert_eq!(cache.get(fp("https://img/b")), None);
        assert!(cache.get(fp("https://img/c")).is_some());
    }

    #[test]
    fn oversized_payloads_are_not_cached() {
        let cache = ImageCache::new(10);
        cache.put(fp("https://img/a"), vec![0u8; 11]);
        assert!(cache.is_empty());
        assert_eq!(cache.used_bytes(), 0);
    }

    #[test]
    fn replacing_an_entry_reclaims_its_bytes() {
        let cache = ImageCache::new(100);
        cache.put(fp("https://img/a"), vec![0u8; 80]);
        cache.put(fp("https://img/a"), vec![0u8; 10]);
        assert_eq!(cache.used_bytes(), 10);
        assert_eq!(cache.len(), 1);
    }
}
