//! In-memory memoization for remote calls.
//!
//! Every key owns a slot guarded by an async mutex. A miss holds the slot lock
//! for the duration of the fetch, so concurrent misses for the same key wait
//! for the first fetch and then read its stored value (single-flight). Only
//! successful fetches are stored.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::time::{Duration, Instant};

struct StoredEntry<V> {
    value: V,
    inserted_at: Instant,
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<StoredEntry<V>>>>;

/// Hit/miss counters for one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct ResultCache<K, V> {
    name: &'static str,
    ttl: Option<Duration>,
    slots: Mutex<HashMap<K, Slot<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Entries older than `ttl` are treated as misses.
    pub fn with_ttl(name: &'static str, ttl: Duration) -> Self {
        Self::new(name, Some(ttl))
    }

    /// Entries live as long as the cache.
    pub fn unbounded(name: &'static str) -> Self {
        Self::new(name, None)
    }

    fn new(name: &'static str, ttl: Option<Duration>) -> Self {
        Self {
            name,
            ttl,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `key`, or runs `fetch` and stores its result.
    /// A failed fetch leaves the slot empty.
    #[tracing::instrument(name = "query_cache", level = "debug", skip(self, fetch), fields(cache = self.name))]
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if self.is_fresh(entry) {
                tracing::debug!("Key found and still fresh");
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value.clone());
            }
            tracing::debug!("Key found but expired");
            *guard = None;
        } else {
            tracing::debug!("Key not found");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = match fetch().await {
            Ok(value) => value,
            Err(err) => {
                drop(guard);
                self.discard_if_unused(&key, &slot);
                return Err(err);
            }
        };
        *guard = Some(StoredEntry {
            value: value.clone(),
            inserted_at: Instant::now(),
        });
        drop(guard);
        self.prune_expired();
        Ok(value)
    }

    /// Fresh cached value without fetching
    pub async fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots().get(key).cloned()?;
        let guard = slot.lock().await;
        guard
            .as_ref()
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone())
    }

    /// Manually removes a key from the cache.
    pub fn remove(&self, key: &K) {
        self.slots().remove(key);
    }

    /// Drops every entry. In-flight fetches still complete into their detached slots.
    pub fn clear(&self) {
        self.slots().clear();
    }

    /// Number of fresh stored values; slots that are mid-fetch are not counted
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| {
                slot.try_lock()
                    .map(|guard| guard.as_ref().is_some_and(|entry| self.is_fresh(entry)))
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn is_fresh(&self, entry: &StoredEntry<V>) -> bool {
        match self.ttl {
            Some(ttl) => entry.inserted_at.elapsed() < ttl,
            None => true,
        }
    }

    /// Drops an empty slot after a failed fetch unless another caller is waiting on it.
    /// The map lock is held, so no new handle to the slot can appear meanwhile.
    fn discard_if_unused(&self, key: &K, slot: &Slot<V>) {
        let mut slots = self.slots();
        let unused = slots.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, slot)
                && Arc::strong_count(slot) == 2
                && slot.try_lock().map(|guard| guard.is_none()).unwrap_or(false)
        });
        if unused {
            slots.remove(key);
        }
    }

    /// Removes expired and abandoned slots nobody else holds.
    fn prune_expired(&self) {
        if self.ttl.is_none() {
            return;
        }
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => guard.as_ref().is_some_and(|entry| self.is_fresh(entry)),
                Err(_) => true,
            }
        });
        let pruned = before - slots.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Dropped expired entries");
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots().len()
    }

    fn slot(&self, key: &K) -> Slot<V> {
        self.slots()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<K, Slot<V>>> {
        // the map is only touched in short non-panicking sections
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
