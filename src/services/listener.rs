//! Push adapter: turns webhook deliveries into classified events.
//!
//! Deliveries for the same entity id are merged in a [`Debouncer`] and
//! classified once the entity has been quiet for the configured interval.
//! Deliveries are only accepted after the allow-listed repositories have
//! been fetched; that happens on the first subscription (or an explicit
//! [`Listener::start`]). If that fetch fails, the next delivery retries it.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{ConfigError, ProviderError};
use crate::domain::models::config::{validate_marker, validate_repositories, validate_users};
use crate::domain::models::{
    CommentPayload, EventKind, EventSelector, ListenerConfig, ProviderItem, Repository, TagSet,
    WebhookDelivery,
};
use crate::domain::ports::IssueProvider;
use crate::services::classifier::Classifier;
use crate::services::debounce::{Debouncer, Merge};
use crate::services::dispatcher::{
    EventCallback, EventSource, SourceId, Subscription, SubscriptionRegistry,
};
use crate::services::normalizer::{normalize_issue, normalize_repository};

/// Source id of the webhook adapter.
pub const LISTENER: SourceId = "listener";

/// Merged state of one entity's deliveries within a debounce window.
#[derive(Debug, Clone)]
struct PendingDelivery {
    item: ProviderItem,
    comment: Option<CommentPayload>,
    repository_id: u64,
}

impl Merge for PendingDelivery {
    fn merge_from(&mut self, newer: Self) {
        self.item.merge_from(newer.item);
        if newer.comment.is_some() {
            self.comment = newer.comment;
        }
        self.repository_id = newer.repository_id;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Idle,
    Starting,
    Started,
    /// The last repository fetch failed; the next delivery retries it.
    Failed,
}

/// What happened to a delivery handed to [`Listener::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Merged into the entity's pending entry.
    Accepted,
    Ignored(IgnoreReason),
}

/// Why a delivery was not merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Repositories have not been fetched yet. Worth redelivering later.
    NotStarted,
    /// The `(event, action)` pair is not part of the issue lifecycle.
    UnsupportedAction,
    /// The delivery's repository is not allow-listed.
    UnknownRepository,
    /// Neither author nor assignees are allow-listed users.
    NotInvolved,
}

type RepositoryCache = Arc<RwLock<HashMap<u64, Repository>>>;

struct ListenerInner {
    provider: Arc<dyn IssueProvider>,
    registry: Arc<SubscriptionRegistry>,
    repos: BTreeSet<String>,
    users: BTreeSet<String>,
    status: Mutex<Status>,
    repositories: RepositoryCache,
    debouncer: Debouncer<u64, PendingDelivery>,
}

/// Webhook ingestion adapter. Cloning shares state.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Validate `config` and build an idle listener.
    pub fn new(
        config: ListenerConfig,
        provider: Arc<dyn IssueProvider>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Result<Self, ConfigError> {
        let repos = validate_repositories(&config.repos)?;
        let users = validate_users(&config.users)?;
        let marker = validate_marker(&config.promotion_marker)?;
        if config.debounce.is_zero() {
            return Err(ConfigError::InvalidDebounceInterval(0));
        }

        let repositories: RepositoryCache = Arc::default();
        let classifier = Classifier::new(marker);
        let debouncer = {
            let repositories = Arc::clone(&repositories);
            let registry = Arc::clone(&registry);
            Debouncer::new(
                config.debounce,
                Arc::new(move |id, pending, tags| {
                    flush(&repositories, &classifier, &registry, id, pending, &tags);
                }),
            )
        };

        Ok(Self {
            inner: Arc::new(ListenerInner {
                provider,
                registry,
                repos,
                users,
                status: Mutex::new(Status::Idle),
                repositories,
                debouncer,
            }),
        })
    }

    fn status(&self) -> Status {
        *self.inner.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: Status) {
        *self.inner.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Whether repositories are fetched and deliveries are being accepted.
    pub fn is_started(&self) -> bool {
        self.status() == Status::Started
    }

    /// Fetch the allow-listed repositories and begin accepting deliveries.
    ///
    /// A no-op if the listener is already starting or started. On failure the
    /// listener is marked failed and may be started again.
    #[instrument(skip(self), fields(repos = self.inner.repos.len()))]
    pub async fn start(&self) -> Result<(), ProviderError> {
        {
            let mut status = self.inner.status.lock().unwrap_or_else(PoisonError::into_inner);
            if !matches!(*status, Status::Idle | Status::Failed) {
                return Ok(());
            }
            *status = Status::Starting;
        }

        let provider = &self.inner.provider;
        let fetched = try_join_all(
            self.inner
                .repos
                .iter()
                .map(|fullname| provider.fetch_repository(fullname)),
        )
        .await;

        match fetched {
            Ok(payloads) => {
                let mut repositories = self
                    .inner
                    .repositories
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                for payload in &payloads {
                    repositories.insert(payload.id, normalize_repository(payload));
                }
                drop(repositories);
                self.set_status(Status::Started);
                info!(repositories = payloads.len(), "listener started");
                Ok(())
            }
            Err(err) => {
                self.set_status(Status::Failed);
                Err(err)
            }
        }
    }

    /// Run [`Listener::start`] in the background, logging a failure.
    fn spawn_start(&self) {
        let listener = self.clone();
        tokio::spawn(async move {
            if let Err(err) = listener.start().await {
                warn!(error = %err, "listener failed to start");
            }
        });
    }

    /// Accept one webhook delivery.
    #[instrument(skip(self, delivery), fields(event = %delivery.event, action = %delivery.action, id = delivery.item.id()))]
    pub fn deliver(&self, delivery: WebhookDelivery) -> DeliveryOutcome {
        match self.status() {
            Status::Started => {}
            Status::Failed => {
                self.spawn_start();
                return DeliveryOutcome::Ignored(IgnoreReason::NotStarted);
            }
            Status::Idle | Status::Starting => {
                return DeliveryOutcome::Ignored(IgnoreReason::NotStarted);
            }
        }
        let Some(tag) = EventKind::from_webhook(&delivery.event, &delivery.action) else {
            return DeliveryOutcome::Ignored(IgnoreReason::UnsupportedAction);
        };
        let known = self
            .inner
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&delivery.repository.id);
        if !known {
            debug!(repository = %delivery.repository.full_name, "repository not allow-listed");
            return DeliveryOutcome::Ignored(IgnoreReason::UnknownRepository);
        }

        let id = delivery.item.id();
        let pending = PendingDelivery {
            item: delivery.item,
            comment: delivery.comment,
            repository_id: delivery.repository.id,
        };
        let users = &self.inner.users;
        let accepted = self.inner.debouncer.push_with(id, tag, pending, |merged| {
            merged.item.payload().involves(users)
        });

        if accepted {
            debug!(%tag, "delivery merged");
            DeliveryOutcome::Accepted
        } else {
            debug!("no allow-listed user involved");
            DeliveryOutcome::Ignored(IgnoreReason::NotInvolved)
        }
    }

    /// Entities waiting for their quiet interval to elapse.
    pub fn pending(&self) -> usize {
        self.inner.debouncer.pending()
    }
}

fn flush(
    repositories: &RwLock<HashMap<u64, Repository>>,
    classifier: &Classifier,
    registry: &SubscriptionRegistry,
    id: u64,
    pending: PendingDelivery,
    tags: &TagSet,
) {
    let repository = repositories
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&pending.repository_id)
        .cloned();
    let Some(repository) = repository else {
        warn!(id, repository_id = pending.repository_id, "repository vanished before flush");
        return;
    };

    let issue = normalize_issue(&pending.item, &repository);
    let comment = pending.comment.as_ref().and_then(|c| c.body.as_deref());
    let Some(classification) = classifier.classify(tags, issue, comment) else {
        return;
    };

    let kind = classification.kind;
    match classification.into_event() {
        Some(event) => {
            let issue = event.issue.without_raw();
            debug!(id, %kind, issue = %issue.reference(), "flushing");
            registry.dispatch(LISTENER, kind, std::slice::from_ref(&issue));
        }
        None => debug!(id, %kind, "classified without payload, dropped"),
    }
}

impl EventSource for Listener {
    fn source_id(&self) -> SourceId {
        LISTENER
    }

    fn subscribe(&self, selector: EventSelector, callback: EventCallback) -> Subscription {
        let subscription = self.inner.registry.subscribe(LISTENER, selector, callback);

        if matches!(self.status(), Status::Idle | Status::Failed) {
            self.spawn_start();
        }
        subscription
    }
}
