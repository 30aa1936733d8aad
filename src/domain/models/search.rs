//! Provider search queries and result pages.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use super::issue::IssueState;
use super::payload::IssuePayload;

/// One predicate of the provider's search dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `repo:<fullname>`
    Repo(String),
    /// `involves:<user>`
    Involves(String),
    /// `is:open` / `is:closed`
    State(IssueState),
    /// `updated:>=<ISO8601>`
    UpdatedSince(DateTime<Utc>),
    /// `in:comments <text>`, or `NOT in:comments <text>` when negated.
    InComments { text: String, negated: bool },
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repo(name) => write!(f, "repo:{name}"),
            Self::Involves(user) => write!(f, "involves:{user}"),
            Self::State(state) => write!(f, "is:{state}"),
            Self::UpdatedSince(at) => {
                write!(f, "updated:>={}", at.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Self::InComments { text, negated } => {
                if *negated {
                    write!(f, "NOT in:comments {text}")
                } else {
                    write!(f, "in:comments {text}")
                }
            }
        }
    }
}

/// A search query, rendered as its predicates joined by spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    predicates: Vec<Predicate>,
    text_matches: bool,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    #[must_use]
    pub fn repos<'a>(self, repos: impl IntoIterator<Item = &'a String>) -> Self {
        repos
            .into_iter()
            .fold(self, |q, r| q.with(Predicate::Repo(r.clone())))
    }

    #[must_use]
    pub fn involving<'a>(self, users: impl IntoIterator<Item = &'a String>) -> Self {
        users
            .into_iter()
            .fold(self, |q, u| q.with(Predicate::Involves(u.clone())))
    }

    /// Ask the provider to return matched text fragments with each item.
    #[must_use]
    pub const fn with_text_matches(mut self) -> Self {
        self.text_matches = true;
        self
    }

    pub const fn wants_text_matches(&self) -> bool {
        self.text_matches
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, predicate) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{predicate}")?;
        }
        Ok(())
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub items: Vec<IssuePayload>,
    /// Whether the provider reports further pages.
    pub has_more: bool,
}
