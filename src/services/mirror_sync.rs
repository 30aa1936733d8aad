//! Downstream consumer applying classified events to the workspace mirror
//! and the ticket tracker.
//!
//! Writes for one resource are serialized through the keyed semaphore, keyed
//! by issue URL (or the promoted URL for promotions). The context handed
//! between holders records what the previous holder did, so a create racing
//! behind an earlier write for the same URL becomes an update.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{SinkError, SinkResult};
use crate::domain::models::{
    EventKind, EventSelector, Issue, IssueKind, IssueRef, IssueState, PromotedLink,
};
use crate::domain::ports::{TicketTracker, WorkspaceMirror};
use crate::services::dispatcher::{callback, CompositeSubscriber, SubscriptionGroup};
use crate::services::semaphore::KeyedSemaphore;

/// Applies lifecycle events to the workspace mirror and ticket tracker.
pub struct MirrorSync {
    mirror: Arc<dyn WorkspaceMirror>,
    tracker: Arc<dyn TicketTracker>,
    semaphore: KeyedSemaphore<EventKind>,
}

impl MirrorSync {
    pub fn new(
        mirror: Arc<dyn WorkspaceMirror>,
        tracker: Arc<dyn TicketTracker>,
        semaphore: KeyedSemaphore<EventKind>,
    ) -> Self {
        Self {
            mirror,
            tracker,
            semaphore,
        }
    }

    /// Subscribe to every event of every adapter behind `subscriber`.
    ///
    /// Each issue of a batch is applied on its own task.
    pub fn attach(self: &Arc<Self>, subscriber: &CompositeSubscriber) -> SubscriptionGroup {
        let sync = Arc::clone(self);
        subscriber.subscribe(
            EventSelector::All,
            callback(move |kind, issues| {
                for issue in issues {
                    let sync = Arc::clone(&sync);
                    let issue = issue.clone();
                    tokio::spawn(async move {
                        let reference = issue.reference();
                        if let Err(err) = sync.apply(kind, issue).await {
                            warn!(%kind, issue = %reference, error = %err, "mirror write failed");
                        }
                    });
                }
            }),
        )
    }

    /// Apply one classified event.
    #[instrument(skip(self, issue), fields(issue = %issue.reference()))]
    pub async fn apply(&self, kind: EventKind, issue: Issue) -> SinkResult<()> {
        match kind {
            EventKind::Created => self.on_created(issue).await,
            EventKind::Updated | EventKind::Closed => self.on_updated(issue).await,
            EventKind::Promoted => self.on_promoted(issue).await,
        }
    }

    async fn on_created(&self, issue: Issue) -> SinkResult<()> {
        let lock = self.semaphore.acquire(&issue.url).await;
        let target = issue.reference();

        // A previous holder already wrote this resource.
        let updated = lock.context().is_some() && self.mirror.update(&target, &issue).await?;
        if updated {
            debug!("record already mirrored, updated instead");
            lock.release(Some(EventKind::Updated));
            return Ok(());
        }

        self.mirror.create(&issue).await?;
        lock.release(Some(EventKind::Created));
        info!("record created");

        if issue.kind == IssueKind::Issue {
            self.tracker.create_ticket(&issue).await?;
        }
        Ok(())
    }

    async fn on_updated(&self, issue: Issue) -> SinkResult<()> {
        let lock = self.semaphore.acquire(&issue.url).await;
        if !self.mirror.update(&issue.reference(), &issue).await? {
            debug!("no mirrored record to update");
        }
        lock.release(Some(EventKind::Updated));
        Ok(())
    }

    async fn on_promoted(&self, issue: Issue) -> SinkResult<()> {
        let (Some(promoted), Some(source)) = (&issue.promoted, &issue.repository.source) else {
            return Err(SinkError::Rejected(format!(
                "{} carries no promotion target",
                issue.reference()
            )));
        };

        let lock = self.semaphore.acquire(&promoted.url).await;
        let target = IssueRef::new(source.fullname.clone(), promoted.number);

        let existing = self.mirror.find(&target).await?;
        if existing.is_some() {
            self.mirror.delete(&target).await?;
            debug!(%target, "removed record mirrored for promotion target");
        }

        let mut record = existing.unwrap_or_else(|| Issue {
            kind: IssueKind::Issue,
            state: IssueState::Open,
            number: promoted.number,
            url: promoted.url.clone(),
            repository: (**source).clone(),
            promoted: None,
            ..issue.clone()
        });
        record.promoted = Some(PromotedLink {
            number: issue.number,
            url: issue.url.clone(),
        });

        if !self.mirror.update(&issue.reference(), &record).await? {
            debug!("fork issue was not mirrored");
        }
        lock.release(Some(EventKind::Updated));
        info!(%target, "promotion applied");
        Ok(())
    }
}
