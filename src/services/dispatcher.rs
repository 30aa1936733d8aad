//! Subscription registry and composite registration across adapters.
//!
//! One registry is constructed at startup and shared (by `Arc`) with every
//! ingestion adapter. Each adapter registers callbacks under its own
//! [`SourceId`] and dispatches only to those, so a consumer subscribed
//! through [`register`] receives each adapter's events exactly through that
//! adapter's subscription.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::domain::models::{EventKind, EventSelector, Issue};

/// Identifies the adapter a subscription belongs to.
pub type SourceId = &'static str;

/// Callback invoked with `(event kind, batch)`.
pub type EventCallback = Arc<dyn Fn(EventKind, &[Issue]) + Send + Sync>;

/// Wrap a closure as an [`EventCallback`].
pub fn callback<F>(f: F) -> EventCallback
where
    F: Fn(EventKind, &[Issue]) + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Registered {
    source: SourceId,
    selector: EventSelector,
    callback: EventCallback,
}

/// Callbacks subscribed to each adapter, keyed by subscription id.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<Uuid, Registered>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(
        self: &Arc<Self>,
        source: SourceId,
        selector: EventSelector,
        callback: EventCallback,
    ) -> Subscription {
        let id = Uuid::new_v4();
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Registered {
                    source,
                    selector,
                    callback,
                },
            );
        debug!(%id, source, "subscription registered");
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(%id, "subscription removed");
        }
        removed
    }

    /// Invoke every callback of `source` whose selector matches `kind`.
    ///
    /// Empty batches are not delivered. Returns the number of callbacks run.
    pub fn dispatch(&self, source: SourceId, kind: EventKind, issues: &[Issue]) -> usize {
        if issues.is_empty() {
            return 0;
        }

        // Callbacks run outside the lock so they may (un)subscribe.
        let callbacks: Vec<EventCallback> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.source == source && s.selector.matches(kind))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        trace!(source, %kind, batch = issues.len(), listeners = callbacks.len(), "dispatching");
        for callback in &callbacks {
            callback(kind, issues);
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by a subscribe call.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Detach the callback from future dispatches. In-flight fetches and
    /// pending timers are not affected.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.unsubscribe(self.id))
    }
}

/// An ingestion adapter consumers can subscribe to.
pub trait EventSource: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Register `callback` for the kinds in `selector`.
    fn subscribe(&self, selector: EventSelector, callback: EventCallback) -> Subscription;
}

/// Fan a single subscription out to several adapters.
pub fn register(sources: Vec<Arc<dyn EventSource>>) -> CompositeSubscriber {
    CompositeSubscriber { sources }
}

/// Subscribe handle over several adapters.
#[derive(Clone)]
pub struct CompositeSubscriber {
    sources: Vec<Arc<dyn EventSource>>,
}

impl CompositeSubscriber {
    pub fn subscribe(&self, selector: EventSelector, callback: EventCallback) -> SubscriptionGroup {
        let handles = self
            .sources
            .iter()
            .map(|source| source.subscribe(selector.clone(), Arc::clone(&callback)))
            .collect();
        SubscriptionGroup { handles }
    }

    /// Number of adapters behind this handle.
    pub fn sources(&self) -> usize {
        self.sources.len()
    }
}

/// The per-adapter handles of one composite subscription.
#[derive(Debug)]
pub struct SubscriptionGroup {
    handles: Vec<Subscription>,
}

impl SubscriptionGroup {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Unsubscribe from every adapter. Returns how many were still active.
    pub fn unsubscribe(self) -> usize {
        self.handles
            .into_iter()
            .map(Subscription::unsubscribe)
            .filter(|removed| *removed)
            .count()
    }
}
