//! Provider payload boundary types.
//!
//! These carry only the fields the sync core consumes. Webhook deliveries
//! and search results are decoded into them once, at the ingestion
//! boundary; missing optional fields fall back to serde defaults instead of
//! failing the decode.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::IssueKind;
use crate::domain::errors::PayloadError;

/// Account object (`user`, `assignees[]`, `owner`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPayload {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub html_url: String,
}

/// Label object. Only the name is consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPayload {
    #[serde(default)]
    pub name: String,
}

/// Text-match fragment returned by search when text matches are requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatch {
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub fragment: Option<String>,
}

/// Shared shape of issues and pull requests, in webhooks and search items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub user: Option<AccountPayload>,
    #[serde(default)]
    pub assignees: Option<Vec<AccountPayload>>,
    #[serde(default)]
    pub labels: Option<Vec<LabelPayload>>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: Option<String>,
    /// Present on search items that are pull requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
    /// API url of the owning repository (search items only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_matches: Vec<TextMatch>,
}

impl IssuePayload {
    /// Overlay the fields present in `newer`. Arrays are replaced, never
    /// concatenated; absent (`None`/empty) fields keep the older value.
    pub fn merge_from(&mut self, newer: Self) {
        fn overlay_string(old: &mut String, new: String) {
            if !new.is_empty() {
                *old = new;
            }
        }
        fn overlay<T>(old: &mut Option<T>, new: Option<T>) {
            if new.is_some() {
                *old = new;
            }
        }

        if newer.id != 0 {
            self.id = newer.id;
        }
        if newer.number != 0 {
            self.number = newer.number;
        }
        overlay_string(&mut self.title, newer.title);
        overlay_string(&mut self.state, newer.state);
        overlay(&mut self.user, newer.user);
        overlay(&mut self.assignees, newer.assignees);
        overlay(&mut self.labels, newer.labels);
        overlay_string(&mut self.html_url, newer.html_url);
        overlay(&mut self.created_at, newer.created_at);
        overlay(&mut self.updated_at, newer.updated_at);
        overlay(&mut self.body, newer.body);
        overlay(&mut self.pull_request, newer.pull_request);
        overlay(&mut self.repository_url, newer.repository_url);
        if !newer.text_matches.is_empty() {
            self.text_matches = newer.text_matches;
        }
    }

    /// Whether the author or any assignee is in `users`.
    pub fn involves(&self, users: &BTreeSet<String>) -> bool {
        let author = self.user.as_ref().is_some_and(|u| users.contains(&u.login));
        author
            || self
                .assignees
                .iter()
                .flatten()
                .any(|a| users.contains(&a.login))
    }

    /// First comment fragment among the search text matches.
    pub fn comment_fragment(&self) -> Option<&str> {
        self.text_matches
            .iter()
            .filter(|m| m.object_type.as_deref() == Some("IssueComment"))
            .find_map(|m| m.fragment.as_deref())
    }
}

/// Tagged union over the two entity kinds the provider reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderItem {
    Issue(IssuePayload),
    PullRequest(IssuePayload),
}

impl ProviderItem {
    /// Build from a search item, which marks pull requests with a
    /// `pull_request` field.
    pub fn from_search(item: IssuePayload) -> Self {
        if item.pull_request.is_some() {
            Self::PullRequest(item)
        } else {
            Self::Issue(item)
        }
    }

    pub const fn payload(&self) -> &IssuePayload {
        match self {
            Self::Issue(p) | Self::PullRequest(p) => p,
        }
    }

    pub const fn kind(&self) -> IssueKind {
        match self {
            Self::Issue(_) => IssueKind::Issue,
            Self::PullRequest(_) => IssueKind::Pull,
        }
    }

    pub const fn id(&self) -> u64 {
        self.payload().id
    }

    /// Deep-merge `newer` over `self`; the newer variant wins.
    pub fn merge_from(&mut self, newer: Self) {
        let pull = matches!(newer, Self::PullRequest(_));
        let (Self::Issue(payload) | Self::PullRequest(payload)) = newer;
        let mut merged = std::mem::take(match self {
            Self::Issue(p) | Self::PullRequest(p) => p,
        });
        merged.merge_from(payload);
        *self = if pull {
            Self::PullRequest(merged)
        } else {
            Self::Issue(merged)
        };
    }
}

/// Repository object, from `GET /repos/{owner}/{repo}` or a webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPayload {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub owner: Option<AccountPayload>,
    #[serde(default)]
    pub fork: bool,
    /// Root of the fork network. Only returned by the repository endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<RepositoryPayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<RepositoryPayload>>,
}

/// Comment object of an `issue_comment` delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPayload {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

/// Wire shape of a webhook body, before it is narrowed to [`WebhookDelivery`].
#[derive(Debug, Deserialize)]
struct RawDelivery {
    #[serde(default)]
    action: String,
    #[serde(default)]
    issue: Option<IssuePayload>,
    #[serde(default)]
    pull_request: Option<IssuePayload>,
    #[serde(default)]
    comment: Option<CommentPayload>,
    #[serde(default)]
    repository: Option<RepositoryPayload>,
}

/// One push delivery: `(event name, action)` plus the entity it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookDelivery {
    /// Value of the event header, e.g. `issues` or `issue_comment`.
    pub event: String,
    pub action: String,
    pub item: ProviderItem,
    pub comment: Option<CommentPayload>,
    pub repository: RepositoryPayload,
}

impl WebhookDelivery {
    /// Decode a webhook body for the given event name.
    pub fn parse(event: &str, body: &[u8]) -> Result<Self, PayloadError> {
        let raw: RawDelivery = serde_json::from_slice(body)?;

        let item = match (raw.pull_request, raw.issue) {
            (Some(pull), _) => ProviderItem::PullRequest(pull),
            // Comments on pull requests arrive as `issue` with a `pull_request` marker.
            (None, Some(issue)) => ProviderItem::from_search(issue),
            (None, None) => return Err(PayloadError::MissingItem),
        };
        let repository = raw.repository.ok_or(PayloadError::MissingRepository)?;

        Ok(Self {
            event: event.to_string(),
            action: raw.action,
            item,
            comment: raw.comment,
            repository,
        })
    }
}
