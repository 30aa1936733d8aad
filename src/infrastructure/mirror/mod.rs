//! Dry-run sinks: an in-memory workspace mirror and a ticket tracker that
//! only logs.
//!
//! Real workspace and ticketing integrations implement the same ports; these
//! back the `serve` command until one is configured, and the tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::errors::{SinkError, SinkResult};
use crate::domain::models::{Issue, IssueRef};
use crate::domain::ports::{TicketTracker, WorkspaceMirror};

/// Workspace mirror held in memory, keyed by `(repository, number)`.
#[derive(Default)]
pub struct InMemoryMirror {
    records: RwLock<BTreeMap<IssueRef, Issue>>,
}

impl InMemoryMirror {
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every record.
    pub async fn records(&self) -> Vec<Issue> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl WorkspaceMirror for InMemoryMirror {
    async fn create(&self, issue: &Issue) -> SinkResult<()> {
        let key = issue.reference();
        let mut records = self.records.write().await;
        if records.contains_key(&key) {
            return Err(SinkError::Rejected(format!("{key} is already mirrored")));
        }
        info!(record = %key, title = %issue.title, "mirror record created");
        records.insert(key, issue.clone());
        Ok(())
    }

    /// Replaces the record at `target`. The replacement is stored under the
    /// issue's own reference, which differs from `target` after a promotion.
    async fn update(&self, target: &IssueRef, issue: &Issue) -> SinkResult<bool> {
        let mut records = self.records.write().await;
        if records.remove(target).is_none() {
            return Ok(false);
        }
        let key = issue.reference();
        info!(record = %key, previous = %target, state = %issue.state, "mirror record updated");
        records.insert(key, issue.clone());
        Ok(true)
    }

    async fn delete(&self, target: &IssueRef) -> SinkResult<bool> {
        let removed = self.records.write().await.remove(target).is_some();
        if removed {
            info!(record = %target, "mirror record deleted");
        }
        Ok(removed)
    }

    async fn find(&self, target: &IssueRef) -> SinkResult<Option<Issue>> {
        Ok(self.records.read().await.get(target).cloned())
    }
}

/// Ticket tracker that records and logs ticket requests.
#[derive(Default)]
pub struct LoggingTracker {
    tickets: Mutex<Vec<IssueRef>>,
}

impl LoggingTracker {
    /// Issues a ticket was requested for, in request order.
    pub fn tickets(&self) -> Vec<IssueRef> {
        self.tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TicketTracker for LoggingTracker {
    async fn create_ticket(&self, issue: &Issue) -> SinkResult<()> {
        let reference = issue.reference();
        info!(issue = %reference, url = %issue.url, "ticket requested");
        self.tickets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reference);
        Ok(())
    }
}
