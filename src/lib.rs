//! Issue Mirror - issue and pull-request lifecycle synchronization
//!
//! Ingests provider activity from two adapters, a webhook listener and a
//! scheduled searcher, normalizes it into a canonical [`Issue`], classifies
//! it into lifecycle events (created, updated, closed, promoted) and
//! dispatches those events to subscribers such as the mirror consumer.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports to external systems
//! - **Service Layer** (`services`): normalization, classification, debouncing,
//!   deduplication, dispatch and the two ingestion adapters
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging,
//!   GitHub client, webhook receiver, sinks
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use issue_mirror::services::{register, Listener, Searcher, SubscriptionRegistry};
//!
//! let registry = SubscriptionRegistry::new();
//! let listener = Listener::new(config.sync.listener_config(), provider.clone(), registry.clone())?;
//! let searcher = Searcher::new(config.sync.searcher_config(), provider, registry)?;
//! let subscriber = register(vec![Arc::new(listener), Arc::new(searcher)]);
//! let _subscriptions = subscriber.subscribe(EventSelector::All, callback(|kind, issues| {
//!     println!("{kind}: {}", issues.len());
//! }));
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{Config, EventKind, EventSelector, Issue, IssueRef, Repository};
pub use domain::ports::{IssueProvider, TicketTracker, WorkspaceMirror};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{register, Listener, MirrorSync, Searcher, SubscriptionRegistry};
