//! Keyed store with per-entry expiry and a size bound.

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Keys in insertion order. A slot is stale once its key was removed or re-inserted.
    order: VecDeque<(K, Instant)>,
}

impl<K: Eq + Hash, V> Inner<K, V> {
    fn is_live(&self, key: &K, inserted_at: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.inserted_at == inserted_at)
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order.retain(|(key, inserted_at)| {
            entries
                .get(key)
                .is_some_and(|entry| entry.inserted_at == *inserted_at)
        });
    }
}

/// Concurrent map whose entries expire `ttl` after insertion.
///
/// Reads share the lock; writes are exclusive. Inserts pop from the front of the insertion
/// queue, dropping expired entries there and then, while the map is full, the oldest live one.
pub struct TtlCache<K, V> {
    inner: RwLock<Inner<K, V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_at(key, Instant::now())
    }

    pub fn get_at<Q>(&self, key: &Q, now: Instant) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(key)
            .filter(|entry| !self.is_expired(entry.inserted_at, now))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.entries.contains_key(&key) {
            self.evict_front(&mut inner, now);
        }
        let previous = inner.entries.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: now,
            },
        );
        if previous.map(|entry| entry.inserted_at) != Some(now) {
            inner.order.push_back((key, now));
        }
        if inner.order.len() > self.capacity.saturating_mul(2) {
            inner.compact();
        }
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.remove(key).map(|entry| entry.value)
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| !self.is_expired(entry.inserted_at, now));
        inner.compact();
        before - inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pops queue slots until the front is live, unexpired, and the map has room.
    fn evict_front(&self, inner: &mut Inner<K, V>, now: Instant) {
        while let Some((key, inserted_at)) = inner.order.front() {
            let live = inner.is_live(key, *inserted_at);
            if live
                && inner.entries.len() < self.capacity
                && !self.is_expired(*inserted_at, now)
            {
                break;
            }
            if let Some((key, _)) = inner.order.pop_front() {
                if live {
                    inner.entries.remove(&key);
                }
            }
        }
    }

    fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) >= self.ttl
    }
}
