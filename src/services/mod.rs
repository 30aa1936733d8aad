pub mod classifier;
pub mod debounce;
pub mod dispatcher;
pub mod listener;
pub mod mirror_sync;
pub mod normalizer;
pub mod poll_dedup;
pub mod search_pages;
pub mod searcher;
pub mod semaphore;

pub use classifier::{Classification, Classifier};
pub use debounce::{Debouncer, Merge};
pub use dispatcher::{
    register, CompositeSubscriber, EventCallback, EventSource, Subscription, SubscriptionGroup,
    SubscriptionRegistry,
};
pub use listener::{DeliveryOutcome, IgnoreReason, Listener};
pub use mirror_sync::MirrorSync;
pub use poll_dedup::PollDeduplicator;
pub use searcher::{CycleReport, Searcher};
pub use semaphore::{KeyedSemaphore, Lock};
