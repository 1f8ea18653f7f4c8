//! Time- and size-bounded shared caches used for trace bookkeeping.

pub(crate) mod correlation;
pub(crate) mod stack;

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    written_at: Instant,
}

/// Concurrent map where entries expire a fixed duration after their last
/// write and the least-recently-written entry is evicted once the map is at
/// capacity.
///
/// Reads never refresh the expiry clock; only inserts and mutating accesses
/// do. Expired entries are dropped lazily when touched and opportunistically
/// on insert.
pub(crate) struct ExpiringCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(ttl: Duration, max_entries: usize) -> Self {
        ExpiringCache {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Insert `value`, evicting the least-recently-written entry if at
    /// capacity.
    pub(crate) fn insert(&self, key: K, value: V) {
        self.make_room_for(&key);
        self.entries.insert(
            key,
            Entry {
                value,
                written_at: Instant::now(),
            },
        );
    }

    /// Insert only if no live entry exists for `key`.
    pub(crate) fn insert_if_absent(&self, key: K, make: impl FnOnce() -> V) {
        self.make_room_for(&key);
        self.entries.entry(key).or_insert_with(|| Entry {
            value: make(),
            written_at: Instant::now(),
        });
    }

    /// Read access to a live entry.
    pub(crate) fn get<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if entry.written_at.elapsed() < self.ttl {
                    return Some(f(&entry.value));
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    /// Mutating access to a live entry; refreshes its expiry clock.
    pub(crate) fn with_mut<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.written_at.elapsed() < self.ttl {
                    let result = f(&mut entry.value);
                    entry.written_at = Instant::now();
                    return Some(result);
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub(crate) fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    fn make_room_for(&self, key: &K) {
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.written_at) < self.ttl);
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            // Ref must be released before removing, DashMap deadlocks
            // otherwise.
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().written_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
    }
}
