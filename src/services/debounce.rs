//! Time-window merge of bursts of raw events per entity.
//!
//! Each key holds at most one live entry: the merged value so far, the tags
//! seen, and the timer that flushes it. A push cancels the pending timer,
//! merges the new value over the old one, and restarts the timer. The flush
//! callback runs once per burst, no sooner than one quiet interval after the
//! last push, with the final merged state.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::domain::models::{EventKind, TagSet};

/// Values that can absorb a newer observation of the same entity.
pub trait Merge {
    /// Overlay `newer` onto `self`; later values win.
    fn merge_from(&mut self, newer: Self);
}

/// Callback receiving a flushed entry.
pub type FlushFn<K, V> = Arc<dyn Fn(K, V, TagSet) + Send + Sync>;

struct Entry<V> {
    value: V,
    tags: TagSet,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner<K, V> {
    interval: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
    generation: AtomicU64,
    flush: FlushFn<K, V>,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash,
{
    fn entries(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, key: K, generation: u64) {
        let entry = {
            let mut entries = self.entries();
            match entries.get(&key) {
                Some(entry) if entry.generation == generation => entries.remove(&key),
                // Superseded by a later push.
                _ => None,
            }
        };
        if let Some(entry) = entry {
            (self.flush)(key, entry.value, entry.tags);
        }
    }
}

/// Per-key debouncer. Cloning shares the same entry map.
pub struct Debouncer<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Debouncer<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Merge + Clone + Send + 'static,
{
    pub fn new(interval: Duration, flush: FlushFn<K, V>) -> Self {
        Self {
            inner: Arc::new(Inner {
                interval,
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                flush,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Merge `update` into the entry for `key` and restart its timer.
    pub fn push(&self, key: K, tag: EventKind, update: V) {
        self.push_with(key, tag, update, |_| true);
    }

    /// Like [`push`](Self::push), but only commits if `accept` approves the
    /// merged value. A rejected push leaves any existing entry and its timer
    /// untouched.
    ///
    /// Must be called from within a tokio runtime.
    pub fn push_with<F>(&self, key: K, tag: EventKind, update: V, accept: F) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let mut entries = self.inner.entries();

        let (candidate, mut tags) = match entries.get(&key) {
            Some(existing) => {
                let mut merged = existing.value.clone();
                merged.merge_from(update);
                (merged, existing.tags.clone())
            }
            None => (update, TagSet::new()),
        };
        if !accept(&candidate) {
            return false;
        }
        tags.push(tag);

        if let Some(previous) = entries.remove(&key) {
            previous.timer.abort();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let timer_key = key.clone();
        let deadline = tokio::time::Instant::now() + inner.interval;
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            inner.fire(timer_key, generation);
        });

        entries.insert(
            key,
            Entry {
                value: candidate,
                tags,
                generation,
                timer,
            },
        );
        true
    }

    /// Number of entries waiting for their quiet interval to elapse.
    pub fn pending(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.inner.entries().contains_key(key)
    }
}
