use std::{
    collections::HashMap,
    hash::Hash,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::{objects::Reference, raster::Surface, resources::pattern::Pattern, xobject::DecodedImage};

/// A small LRU cache with an entry-count bound and an optional TTL.
///
/// Recency is tracked with a monotone counter; eviction scans for the
/// stalest entry, which is fine at the capacities rendering uses.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<K, Entry<V>>,
    tick: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_used: u64,
    inserted: Instant,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            tick: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(ttl) = self.ttl {
            if let Some(entry) = self.entries.get(key) {
                if entry.inserted.elapsed() > ttl {
                    self.entries.remove(key);
                    return None;
                }
            }
        }

        self.tick += 1;
        let tick = self.tick;

        self.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.value.clone()
        })
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(stalest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&stalest);
            }
        }

        self.tick += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                last_used: self.tick,
                inserted: Instant::now(),
            },
        );
    }
}

/// The per-context render caches: decoded image samples keyed by the
/// XObject's indirect reference, and rasterized pattern tiles keyed by
/// pattern identity.
///
/// Owned by one render context and dropped with it; nothing here is
/// shared between page workers, so no locking is involved.
#[derive(Debug)]
pub struct RenderCache {
    pub images: LruCache<Reference, Rc<DecodedImage>>,

    /// Keyed by the pattern's allocation address. The pattern itself is
    /// held in the entry, which keeps the address stable for the life of
    /// the cache line.
    pub tiles: LruCache<usize, (Rc<Pattern>, Rc<Surface>)>,
}

impl RenderCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            images: LruCache::new(capacity, ttl),
            tiles: LruCache::new(capacity, ttl),
        }
    }

    pub fn tile_key(pattern: &Rc<Pattern>) -> usize {
        Rc::as_ptr(pattern) as usize
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache: LruCache<u32, u32> = LruCache::new(2, None);

        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.get(&1), Some(10));

        // 2 is now the stalest and gets evicted
        cache.insert(3, 30);

        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&3), Some(30));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinsert_updates_in_place() {
        let mut cache: LruCache<u32, u32> = LruCache::new(1, None);

        cache.insert(1, 10);
        cache.insert(1, 11);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), Some(11));
    }

    #[test]
    fn expired_entries_vanish() {
        let mut cache: LruCache<u32, u32> = LruCache::new(4, Some(Duration::from_secs(0)));

        cache.insert(1, 10);
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }
}
