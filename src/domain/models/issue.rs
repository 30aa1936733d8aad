//! Canonical issue and repository representation.
//!
//! Every ingestion path converts provider payloads into these types exactly
//! once (see [`crate::services::normalizer`]); everything downstream of the
//! normalizer works on [`Issue`] and [`Repository`] only.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payload::ProviderItem;

/// Whether an [`Issue`] is a plain issue or a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Issue,
    Pull,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Issue => write!(f, "issue"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Open/closed state of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    /// Map a provider state string. Anything other than `closed` is open.
    pub fn from_provider(state: &str) -> Self {
        if state.trim().eq_ignore_ascii_case("closed") {
            Self::Closed
        } else {
            Self::Open
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider account referenced by an issue (author or assignee).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub url: String,
}

/// A repository as fetched from the provider.
///
/// Repositories are fetched once per adapter and cached; they are never
/// mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub fullname: String,
    pub url: String,
    /// Repository this one was forked from. Only present for forks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<Repository>>,
}

impl Repository {
    pub fn is_fork(&self) -> bool {
        self.source.is_some()
    }
}

/// Back-link from a promoted fork issue to the issue it became upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromotedLink {
    pub number: u64,
    pub url: String,
}

/// Identity of an issue at a point in time: `(repository fullname, number)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub repository: String,
    pub number: u64,
}

impl IssueRef {
    pub fn new(repository: impl Into<String>, number: u64) -> Self {
        Self {
            repository: repository.into(),
            number,
        }
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repository, self.number)
    }
}

/// Canonical representation of an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Provider-native entity id.
    pub id: u64,
    pub kind: IssueKind,
    pub state: IssueState,
    pub number: u64,
    pub title: String,
    pub author: User,
    pub assignees: BTreeSet<User>,
    pub labels: BTreeSet<String>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub repository: Repository,
    /// Set only after a promotion comment was parsed successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted: Option<PromotedLink>,
    #[serde(default)]
    pub description: String,
    /// Provider payload the issue was built from. Stripped before dispatch.
    #[serde(skip)]
    pub raw: Option<ProviderItem>,
}

impl Issue {
    pub fn reference(&self) -> IssueRef {
        IssueRef::new(self.repository.fullname.clone(), self.number)
    }

    /// Drop the retained provider payload; dispatched issues never carry it.
    #[must_use]
    pub fn without_raw(mut self) -> Self {
        self.raw = None;
        self
    }

    /// Whether the author or any assignee is in `users`.
    pub fn involves(&self, users: &BTreeSet<String>) -> bool {
        users.contains(&self.author.name) || self.assignees.iter().any(|a| users.contains(&a.name))
    }
}
