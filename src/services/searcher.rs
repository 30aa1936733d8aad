//! Poll adapter: sweeps the provider's issue search on a cron schedule.
//!
//! Each cycle searches from the previous tick (minus a clock-skew margin)
//! with two queries:
//!
//! - updates: `repo:… involves:… updated:>=… NOT in:comments <marker>`,
//!   bucketed into Created / Updated / Closed;
//! - promotions: `repo:… involves:… is:closed updated:>=… in:comments <marker>`
//!   with text matches, whose comment fragment feeds the promotion parser.
//!
//! Results are deduplicated against the previous cycle per event kind before
//! dispatch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::{join, try_join_all};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{ConfigError, ProviderError};
use crate::domain::models::config::{
    parse_schedule, validate_marker, validate_repositories, validate_users,
};
use crate::domain::models::{
    EventKind, EventSelector, Issue, IssuePayload, IssueState, Predicate, ProviderItem,
    Repository, SearchQuery, SearcherConfig, TagSet,
};
use crate::domain::ports::IssueProvider;
use crate::services::classifier::{bucket_updates, Classifier};
use crate::services::dispatcher::{
    EventCallback, EventSource, SourceId, Subscription, SubscriptionRegistry,
};
use crate::services::normalizer::{normalize_issue, normalize_repository, repository_from_api_url};
use crate::services::poll_dedup::PollDeduplicator;
use crate::services::search_pages::collect_search;

/// Source id of the poll adapter.
pub const SEARCHER: SourceId = "searcher";

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Issues dispatched per event kind.
    pub dispatched: BTreeMap<EventKind, usize>,
    /// Issues suppressed as already notified by the previous cycle.
    pub suppressed: usize,
    /// Queries that failed and contributed nothing.
    pub failed_queries: usize,
}

impl CycleReport {
    /// Issues dispatched across all kinds.
    pub fn total_dispatched(&self) -> usize {
        self.dispatched.values().sum()
    }
}

struct SearcherInner {
    provider: Arc<dyn IssueProvider>,
    registry: Arc<SubscriptionRegistry>,
    repos: BTreeSet<String>,
    users: BTreeSet<String>,
    schedule: Schedule,
    classifier: Classifier,
    dedup: PollDeduplicator,
    clock_skew: chrono::Duration,
    repositories: RwLock<HashMap<String, Repository>>,
    last_tick: Mutex<DateTime<Utc>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Search ingestion adapter. Cloning shares state.
#[derive(Clone)]
pub struct Searcher {
    inner: Arc<SearcherInner>,
}

impl Searcher {
    /// Validate `config` and build an idle searcher.
    pub fn new(
        config: SearcherConfig,
        provider: Arc<dyn IssueProvider>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Result<Self, ConfigError> {
        let repos = validate_repositories(&config.repos)?;
        let users = validate_users(&config.users)?;
        let marker = validate_marker(&config.promotion_marker)?;
        if config.retention.is_zero() {
            return Err(ConfigError::InvalidRetentionWindow(0));
        }
        let schedule = parse_schedule(&config.schedule, config.retention)?;
        let clock_skew = chrono::Duration::from_std(config.clock_skew)
            .map_err(|e| ConfigError::ValidationFailed(format!("clock skew: {e}")))?;

        Ok(Self {
            inner: Arc::new(SearcherInner {
                provider,
                registry,
                repos,
                users,
                schedule,
                classifier: Classifier::new(marker),
                dedup: PollDeduplicator::new(config.retention),
                clock_skew,
                repositories: RwLock::new(HashMap::new()),
                last_tick: Mutex::new(config.start_at.unwrap_or_else(Utc::now)),
                task: Mutex::new(None),
            }),
        })
    }

    fn task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the schedule loop is active.
    pub fn is_running(&self) -> bool {
        self.task().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Next scheduled tick after now.
    pub fn next_tick(&self) -> Option<DateTime<Utc>> {
        self.inner.schedule.after(&Utc::now()).next()
    }

    fn base_query(&self) -> SearchQuery {
        SearchQuery::new()
            .repos(&self.inner.repos)
            .involving(&self.inner.users)
    }

    /// Issues updated since `cursor` without a promotion comment.
    pub fn updates_query(&self, cursor: DateTime<Utc>) -> SearchQuery {
        self.base_query()
            .with(Predicate::UpdatedSince(cursor))
            .with(Predicate::InComments {
                text: self.inner.classifier.marker().to_string(),
                negated: true,
            })
    }

    /// Closed issues updated since `cursor` carrying a promotion comment.
    pub fn promotions_query(&self, cursor: DateTime<Utc>) -> SearchQuery {
        self.base_query()
            .with(Predicate::State(IssueState::Closed))
            .with(Predicate::UpdatedSince(cursor))
            .with(Predicate::InComments {
                text: self.inner.classifier.marker().to_string(),
                negated: false,
            })
            .with_text_matches()
    }

    async fn ensure_repositories(&self) -> Result<(), ProviderError> {
        let cached = !self
            .inner
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if cached {
            return Ok(());
        }

        let provider = &self.inner.provider;
        let payloads = try_join_all(
            self.inner
                .repos
                .iter()
                .map(|fullname| provider.fetch_repository(fullname)),
        )
        .await?;

        let mut repositories = self
            .inner
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for payload in &payloads {
            let repository = normalize_repository(payload);
            repositories.insert(repository.fullname.clone(), repository);
        }
        Ok(())
    }

    fn normalize(&self, items: Vec<IssuePayload>) -> Vec<(Issue, Option<String>)> {
        let repositories = self
            .inner
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        items
            .into_iter()
            .filter_map(|payload| {
                let fullname = payload
                    .repository_url
                    .as_deref()
                    .and_then(repository_from_api_url);
                let Some(repository) = fullname.and_then(|name| repositories.get(name)) else {
                    debug!(number = payload.number, "search item from unknown repository");
                    return None;
                };
                let comment = payload.comment_fragment().map(str::to_string);
                let item = ProviderItem::from_search(payload);
                Some((normalize_issue(&item, repository), comment))
            })
            .collect()
    }

    fn publish(&self, kind: EventKind, issues: Vec<Issue>, report: &mut CycleReport) {
        let issues: Vec<Issue> = issues.into_iter().map(Issue::without_raw).collect();
        let found = issues.len();
        let fresh = self.inner.dedup.filter(kind, issues);
        report.suppressed += found - fresh.len();
        if fresh.is_empty() {
            return;
        }
        *report.dispatched.entry(kind).or_default() += fresh.len();
        self.inner.registry.dispatch(SEARCHER, kind, &fresh);
    }

    /// Run one poll cycle covering changes since `previous_tick`.
    ///
    /// Fails only if the repositories cannot be fetched; a failed query is
    /// logged and counted in the report.
    #[instrument(skip_all, fields(previous_tick = %previous_tick))]
    pub async fn run_cycle(
        &self,
        previous_tick: DateTime<Utc>,
    ) -> Result<CycleReport, ProviderError> {
        self.inner.dedup.purge_expired();
        self.ensure_repositories().await?;

        let cursor = previous_tick - self.inner.clock_skew;
        let updates = self.updates_query(cursor);
        let promotions = self.promotions_query(cursor);
        let provider = self.inner.provider.as_ref();

        let (updated, promoted) = join(
            collect_search(provider, &updates),
            collect_search(provider, &promotions),
        )
        .await;

        let mut report = CycleReport::default();

        match updated {
            Ok(items) => {
                let issues = self.normalize(items).into_iter().map(|(i, _)| i).collect();
                for (kind, bucket) in bucket_updates(issues) {
                    self.publish(kind, bucket, &mut report);
                }
            }
            Err(err) => {
                warn!(error = %err, query = %updates, "updates query failed");
                report.failed_queries += 1;
            }
        }

        match promoted {
            Ok(items) => {
                let tags: TagSet = [EventKind::Closed, EventKind::Promoted].into_iter().collect();
                let issues = self
                    .normalize(items)
                    .into_iter()
                    .filter_map(|(issue, comment)| {
                        self.inner
                            .classifier
                            .classify(&tags, issue, comment.as_deref())
                            .and_then(|c| c.into_event())
                            .map(|event| event.issue)
                    })
                    .collect();
                self.publish(EventKind::Promoted, issues, &mut report);
            }
            Err(err) => {
                warn!(error = %err, query = %promotions, "promotions query failed");
                report.failed_queries += 1;
            }
        }

        Ok(report)
    }

    async fn tick(&self, at: DateTime<Utc>) {
        let previous = *self.inner.last_tick.lock().unwrap_or_else(PoisonError::into_inner);

        match self.run_cycle(previous).await {
            Ok(report) if report.failed_queries == 0 => {
                *self.inner.last_tick.lock().unwrap_or_else(PoisonError::into_inner) = at;
                info!(
                    dispatched = report.total_dispatched(),
                    suppressed = report.suppressed,
                    "poll cycle complete"
                );
            }
            // The cursor stays put so the next cycle covers this window again.
            Ok(report) => warn!(failed = report.failed_queries, "poll cycle incomplete"),
            Err(err) => warn!(error = %err, "poll cycle failed"),
        }
    }

    /// Start the schedule loop if it is not running yet.
    pub fn start(&self) {
        let mut task = self.task();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let searcher = self.clone();
        *task = Some(tokio::spawn(async move {
            loop {
                let Some(next) = searcher.next_tick() else {
                    warn!("schedule has no upcoming ticks, stopping");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                searcher.tick(next).await;
            }
        }));
        info!("searcher started");
    }

    /// Stop the schedule loop. Already dispatched events are unaffected.
    pub fn stop(&self) {
        if let Some(task) = self.task().take() {
            task.abort();
            info!("searcher stopped");
        }
    }
}

impl EventSource for Searcher {
    fn source_id(&self) -> SourceId {
        SEARCHER
    }

    fn subscribe(&self, selector: EventSelector, callback: EventCallback) -> Subscription {
        let subscription = self.inner.registry.subscribe(SEARCHER, selector, callback);
        self.start();
        subscription
    }
}
