//! Cross-cycle suppression for the poll path.
//!
//! Search windows overlap (the cursor is moved back by a clock-skew margin),
//! so the same issue is usually returned by consecutive cycles. For each
//! event kind the set notified last is retained; a new batch forwards only
//! issues not structurally equal to a retained one, then becomes the new
//! retained set. Retained sets expire after a fixed window.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::models::{EventKind, Issue};

/// How long a notified set is remembered without further activity.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(180);

struct Retained {
    issues: Vec<Issue>,
    expires_at: Instant,
}

/// Suppresses issues already notified by the previous poll cycle.
pub struct PollDeduplicator {
    retention: Duration,
    state: Mutex<HashMap<EventKind, Retained>>,
}

impl Default for PollDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl PollDeduplicator {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, HashMap<EventKind, Retained>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the issues of `batch` not notified by the previous cycle for
    /// `kind`, and retain `batch` for the next one.
    ///
    /// An empty batch leaves the retained set as it is.
    pub fn filter(&self, kind: EventKind, batch: Vec<Issue>) -> Vec<Issue> {
        if batch.is_empty() {
            return batch;
        }

        let now = Instant::now();
        let mut state = self.state();

        let fresh: Vec<Issue> = match state.get(&kind) {
            Some(previous) if previous.expires_at > now => batch
                .iter()
                .filter(|issue| !previous.issues.contains(issue))
                .cloned()
                .collect(),
            _ => batch.clone(),
        };

        state.insert(
            kind,
            Retained {
                issues: batch,
                expires_at: now + self.retention,
            },
        );
        fresh
    }

    /// Drop retained sets whose window has elapsed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state();
        let before = state.len();
        state.retain(|_, retained| retained.expires_at > now);
        before - state.len()
    }

    /// Number of issues currently retained for `kind`.
    pub fn retained(&self, kind: EventKind) -> usize {
        let now = Instant::now();
        self.state()
            .get(&kind)
            .filter(|r| r.expires_at > now)
            .map_or(0, |r| r.issues.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{IssueKind, IssueState, Repository, User};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn issue(number: u64, title: &str) -> Issue {
        Issue {
            id: number,
            kind: IssueKind::Issue,
            state: IssueState::Open,
            number,
            title: title.to_string(),
            author: User::default(),
            assignees: BTreeSet::new(),
            labels: BTreeSet::new(),
            url: format!("https://github.com/acme/widgets/issues/{number}"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            repository: Repository {
                owner: "acme".to_string(),
                name: "widgets".to_string(),
                fullname: "acme/widgets".to_string(),
                url: String::new(),
                source: None,
            },
            promoted: None,
            description: String::new(),
            raw: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_cycles_notify_once() {
        let dedup = PollDeduplicator::default();
        let a = issue(1, "a");
        let b = issue(2, "b");

        let first = dedup.filter(EventKind::Updated, vec![a.clone()]);
        assert_eq!(first, vec![a.clone()]);

        let second = dedup.filter(EventKind::Updated, vec![a.clone(), b.clone()]);
        assert_eq!(second, vec![b]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_issue_is_not_suppressed() {
        let dedup = PollDeduplicator::default();
        dedup.filter(EventKind::Updated, vec![issue(1, "a")]);

        let changed = dedup.filter(EventKind::Updated, vec![issue(1, "renamed")]);
        assert_eq!(changed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_are_independent() {
        let dedup = PollDeduplicator::default();
        let a = issue(1, "a");
        dedup.filter(EventKind::Updated, vec![a.clone()]);
        assert_eq!(dedup.filter(EventKind::Closed, vec![a.clone()]), vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reappears_after_retention() {
        let dedup = PollDeduplicator::new(Duration::from_secs(180));
        let a = issue(1, "a");
        dedup.filter(EventKind::Created, vec![a.clone()]);

        tokio::time::advance(Duration::from_secs(179)).await;
        assert_eq!(dedup.retained(EventKind::Created), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(dedup.retained(EventKind::Created), 0);
        assert_eq!(dedup.purge_expired(), 1);
        assert_eq!(dedup.filter(EventKind::Created, vec![a.clone()]), vec![a]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_keeps_retained_set() {
        let dedup = PollDeduplicator::default();
        let a = issue(1, "a");
        dedup.filter(EventKind::Closed, vec![a.clone()]);

        assert!(dedup.filter(EventKind::Closed, Vec::new()).is_empty());
        assert!(dedup.filter(EventKind::Closed, vec![a]).is_empty());
    }
}
