//! Keyed semaphore with context handoff.
//!
//! Each key admits at most `limit` concurrent holders. Further acquirers
//! queue FIFO and are handed a lock directly by a releasing holder, together
//! with the context that holder left behind. Distinct keys never block each
//! other. Key state is created lazily and kept for the semaphore's lifetime.
//!
//! There is no timeout: a holder that never releases (and is never dropped)
//! starves its key.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::domain::errors::ConfigError;

struct KeyState<C: Clone> {
    holders: usize,
    waiters: VecDeque<oneshot::Sender<Lock<C>>>,
    context: Option<C>,
}

impl<C: Clone> Default for KeyState<C> {
    fn default() -> Self {
        Self {
            holders: 0,
            waiters: VecDeque::new(),
            context: None,
        }
    }
}

enum Handover<C> {
    Replace(Option<C>),
    Keep,
}

struct Inner<C: Clone> {
    limit: usize,
    keys: Mutex<HashMap<String, KeyState<C>>>,
}

impl<C: Clone> Inner<C> {
    fn keys(&self) -> MutexGuard<'_, HashMap<String, KeyState<C>>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(self: &Arc<Self>, key: &str, handover: Handover<C>) {
        let mut keys = self.keys();
        let Some(state) = keys.get_mut(key) else {
            return;
        };
        if let Handover::Replace(context) = handover {
            state.context = context;
        }

        // The slot passes straight to the next live waiter; the holder count
        // stays the same.
        while let Some(waiter) = state.waiters.pop_front() {
            let lock = Lock {
                key: key.to_string(),
                context: state.context.clone(),
                semaphore: Arc::clone(self),
                released: false,
            };
            match waiter.send(lock) {
                Ok(()) => return,
                // Waiter went away; its lock must not release again.
                Err(mut rejected) => rejected.released = true,
            }
        }
        state.holders = state.holders.saturating_sub(1);
    }
}

/// A held slot on one key of a [`KeyedSemaphore`].
///
/// Dropping a lock without calling [`release`](Lock::release) frees the
/// slot and keeps the key's stored context unchanged.
pub struct Lock<C: Clone> {
    key: String,
    context: Option<C>,
    semaphore: Arc<Inner<C>>,
    released: bool,
}

impl<C: Clone> Lock<C> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Context left by the previous holder of this key, if any.
    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    /// Free the slot, storing `context` for the next holder.
    pub fn release(mut self, context: Option<C>) {
        self.released = true;
        self.semaphore.release(&self.key, Handover::Replace(context));
    }
}

impl<C: Clone> Drop for Lock<C> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.semaphore.release(&self.key, Handover::Keep);
        }
    }
}

impl<C: Clone + fmt::Debug> fmt::Debug for Lock<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

enum Slot<C: Clone> {
    Ready(Lock<C>),
    Queued(oneshot::Receiver<Lock<C>>),
}

/// Per-key bounded concurrency limiter. Cloning shares the key state.
pub struct KeyedSemaphore<C: Clone> {
    inner: Arc<Inner<C>>,
}

impl<C: Clone> Clone for KeyedSemaphore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clone + Send + 'static> KeyedSemaphore<C> {
    /// Create a semaphore admitting `limit` holders per key.
    pub fn new(limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::InvalidSemaphoreLimit(limit));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                limit,
                keys: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    fn slot(&self, key: &str, enqueue: bool) -> Option<Slot<C>> {
        let mut keys = self.inner.keys();
        let state = keys.entry(key.to_string()).or_default();

        if state.holders < self.inner.limit {
            state.holders += 1;
            return Some(Slot::Ready(Lock {
                key: key.to_string(),
                context: state.context.clone(),
                semaphore: Arc::clone(&self.inner),
                released: false,
            }));
        }
        if !enqueue {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        Some(Slot::Queued(rx))
    }

    /// Take a slot on `key` if one is free right now.
    pub fn try_acquire(&self, key: impl AsRef<str>) -> Option<Lock<C>> {
        match self.slot(key.as_ref(), false) {
            Some(Slot::Ready(lock)) => Some(lock),
            _ => None,
        }
    }

    /// Take a slot on `key`, waiting in FIFO order behind earlier callers.
    pub async fn acquire(&self, key: impl AsRef<str>) -> Lock<C> {
        let key = key.as_ref();
        loop {
            match self.slot(key, true) {
                Some(Slot::Ready(lock)) => return lock,
                Some(Slot::Queued(rx)) => {
                    if let Ok(lock) = rx.await {
                        return lock;
                    }
                }
                None => {}
            }
        }
    }

    /// Current holder count of `key`.
    pub fn holders(&self, key: &str) -> usize {
        self.inner.keys().get(key).map_or(0, |s| s.holders)
    }

    /// Number of callers queued on `key`.
    pub fn waiting(&self, key: &str) -> usize {
        self.inner
            .keys()
            .get(key)
            .map_or(0, |s| s.waiters.iter().filter(|w| !w.is_closed()).count())
    }
}
