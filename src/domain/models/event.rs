//! Lifecycle event kinds and the tag sets accumulated while debouncing.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::issue::Issue;

/// Terminal lifecycle transition notified downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "issues.created")]
    Created,
    #[serde(rename = "issues.updated")]
    Updated,
    #[serde(rename = "issues.closed")]
    Closed,
    #[serde(rename = "issues.promoted")]
    Promoted,
}

impl EventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Created, Self::Updated, Self::Closed, Self::Promoted];

    /// Wire name of the event.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "issues.created",
            Self::Updated => "issues.updated",
            Self::Closed => "issues.closed",
            Self::Promoted => "issues.promoted",
        }
    }

    /// Tag for a webhook `(event, action)` pair, or `None` if the delivery
    /// does not concern the issue lifecycle.
    pub fn from_webhook(event: &str, action: &str) -> Option<Self> {
        match (event, action) {
            ("issues" | "pull_request", "opened") => Some(Self::Created),
            (
                "issues" | "pull_request",
                "reopened" | "labeled" | "unlabeled" | "assigned" | "unassigned" | "edited",
            ) => Some(Self::Updated),
            ("issues" | "pull_request", "closed") => Some(Self::Closed),
            ("issue_comment", "created") => Some(Self::Promoted),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of raw event tags seen for one entity within a merge window.
///
/// Insertion order is kept so the most recently added tag can be recovered;
/// a tag that is seen again moves to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<EventKind>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tag`, moving it to the end if already present.
    pub fn push(&mut self, tag: EventKind) {
        self.0.retain(|t| *t != tag);
        self.0.push(tag);
    }

    pub fn contains(&self, tag: EventKind) -> bool {
        self.0.contains(&tag)
    }

    /// Whether every tag in `tags` has been seen.
    pub fn contains_all(&self, tags: &[EventKind]) -> bool {
        tags.iter().all(|t| self.contains(*t))
    }

    /// Most recently added tag.
    pub fn latest(&self) -> Option<EventKind> {
        self.0.last().copied()
    }

    /// Number of distinct tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.0.iter().copied()
    }
}

impl From<EventKind> for TagSet {
    fn from(tag: EventKind) -> Self {
        Self(vec![tag])
    }
}

impl FromIterator<EventKind> for TagSet {
    fn from_iter<I: IntoIterator<Item = EventKind>>(iter: I) -> Self {
        let mut tags = Self::new();
        for tag in iter {
            tags.push(tag);
        }
        tags
    }
}

/// Which event kinds a subscription wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSelector {
    /// Every kind (`"*"`).
    All,
    Only(BTreeSet<EventKind>),
}

impl EventSelector {
    /// Selector for the given kinds only.
    pub fn only(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self::Only(kinds.into_iter().collect())
    }

    /// Whether events of `kind` pass this selector.
    pub fn matches(&self, kind: EventKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(&kind),
        }
    }
}

impl From<EventKind> for EventSelector {
    fn from(kind: EventKind) -> Self {
        Self::only([kind])
    }
}

/// A classified event in transit from classification to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub kind: EventKind,
    pub issue: Issue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_webhook_mapping() {
        assert_eq!(EventKind::from_webhook("issues", "opened"), Some(EventKind::Created));
        assert_eq!(
            EventKind::from_webhook("pull_request", "opened"),
            Some(EventKind::Created)
        );
        for action in ["reopened", "labeled", "unlabeled", "assigned", "unassigned", "edited"] {
            assert_eq!(EventKind::from_webhook("issues", action), Some(EventKind::Updated));
            assert_eq!(
                EventKind::from_webhook("pull_request", action),
                Some(EventKind::Updated)
            );
        }
        assert_eq!(EventKind::from_webhook("issues", "closed"), Some(EventKind::Closed));
        assert_eq!(
            EventKind::from_webhook("issue_comment", "created"),
            Some(EventKind::Promoted)
        );
        assert_eq!(EventKind::from_webhook("issue_comment", "edited"), None);
        assert_eq!(EventKind::from_webhook("issues", "milestoned"), None);
        assert_eq!(EventKind::from_webhook("push", "opened"), None);
    }

    #[test]
    fn test_tag_set_latest_tracks_last_push() {
        let mut tags = TagSet::from(EventKind::Created);
        tags.push(EventKind::Updated);
        assert_eq!(tags.latest(), Some(EventKind::Updated));

        tags.push(EventKind::Created);
        assert_eq!(tags.latest(), Some(EventKind::Created));
        assert_eq!(tags.len(), 2);
        assert!(tags.contains_all(&[EventKind::Created, EventKind::Updated]));
        assert!(!tags.contains(EventKind::Closed));
    }

    #[test]
    fn test_selector_matches() {
        assert!(EventSelector::All.matches(EventKind::Promoted));
        let selector = EventSelector::only([EventKind::Updated, EventKind::Closed]);
        assert!(selector.matches(EventKind::Closed));
        assert!(!selector.matches(EventKind::Created));
    }

    #[test]
    fn test_event_kind_serde_names() {
        let json = serde_json::to_string(&EventKind::Promoted).unwrap();
        assert_eq!(json, "\"issues.promoted\"");
        assert_eq!(EventKind::Promoted.to_string(), "issues.promoted");
    }
}
