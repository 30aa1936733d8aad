//! Turns an accumulated tag set plus a normalized issue into one terminal
//! lifecycle event.
//!
//! Rules, in priority order:
//! 1. `{Promoted, Closed}`: parse the promotion marker out of the latest
//!    comment. Success on a fork attaches a [`PromotedLink`]; any failure
//!    yields `Promoted` with no issue, which callers drop.
//! 2. `{Created, Updated}`: `Created`.
//! 3. Otherwise the most recently added tag.

use tracing::debug;

use crate::domain::models::{
    ClassifiedEvent, EventKind, Issue, IssueState, PromotedLink, TagSet,
};

/// Comment command promoting a fork issue, unless configured otherwise.
pub const DEFAULT_PROMOTION_MARKER: &str = "/promoted";

/// Classifier output. `issue == None` means "do not notify".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Resolved lifecycle event.
    pub kind: EventKind,
    /// Issue to notify with, possibly re-pointed by a promotion.
    pub issue: Option<Issue>,
}

impl Classification {
    /// The event to dispatch, if any.
    pub fn into_event(self) -> Option<ClassifiedEvent> {
        let kind = self.kind;
        self.issue.map(|issue| ClassifiedEvent { kind, issue })
    }
}

/// Resolves a merged tag set into one lifecycle event.
#[derive(Debug, Clone)]
pub struct Classifier {
    marker: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_PROMOTION_MARKER)
    }
}

impl Classifier {
    /// Classifier recognising promotion comments that start with `marker`.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// The promotion command token.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Classify one merged entity. Returns `None` only for an empty tag set.
    pub fn classify(
        &self,
        tags: &TagSet,
        mut issue: Issue,
        comment: Option<&str>,
    ) -> Option<Classification> {
        if tags.contains_all(&[EventKind::Promoted, EventKind::Closed]) {
            let number = comment.and_then(|c| parse_promotion(c, &self.marker));
            let source_url = issue.repository.source.as_ref().map(|s| s.url.clone());

            let issue = match (number, source_url) {
                (Some(number), Some(source_url)) => {
                    issue.promoted = Some(PromotedLink {
                        number,
                        url: format!("{source_url}/issues/{number}"),
                    });
                    Some(issue)
                }
                (number, source) => {
                    debug!(
                        issue = %issue.reference(),
                        parsed = number.is_some(),
                        fork = source.is_some(),
                        "promotion could not be resolved, dropping"
                    );
                    None
                }
            };
            return Some(Classification {
                kind: EventKind::Promoted,
                issue,
            });
        }

        if tags.contains_all(&[EventKind::Created, EventKind::Updated]) {
            return Some(Classification {
                kind: EventKind::Created,
                issue: Some(issue),
            });
        }

        tags.latest().map(|kind| Classification {
            kind,
            issue: Some(issue),
        })
    }
}

/// Integer token immediately following `marker` in `comment`.
///
/// The token must be a bare decimal number; `#42` or `42.` do not parse.
pub fn parse_promotion(comment: &str, marker: &str) -> Option<u64> {
    if marker.is_empty() {
        return None;
    }
    let (_, rest) = comment.split_once(marker)?;
    rest.split_whitespace().next()?.parse().ok()
}

/// Split a poll result into Created / Updated / Closed buckets.
///
/// Open issues whose creation and update times coincide are new; other open
/// issues were updated; closed issues are closed.
pub fn bucket_updates(issues: Vec<Issue>) -> Vec<(EventKind, Vec<Issue>)> {
    let mut created = Vec::new();
    let mut updated = Vec::new();
    let mut closed = Vec::new();

    for issue in issues {
        match issue.state {
            IssueState::Closed => closed.push(issue),
            IssueState::Open if issue.created_at >= issue.updated_at => created.push(issue),
            IssueState::Open => updated.push(issue),
        }
    }

    vec![
        (EventKind::Created, created),
        (EventKind::Updated, updated),
        (EventKind::Closed, closed),
    ]
}
