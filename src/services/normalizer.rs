//! Provider payload → canonical model mapping.
//!
//! Pure functions. Missing optional fields fall back to documented defaults
//! (empty sets, empty strings, the Unix epoch for absent timestamps) and
//! never fail.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::domain::models::{
    AccountPayload, Issue, IssueState, ProviderItem, Repository, RepositoryPayload, User,
};

/// Map a fetched repository, following `source` (or `parent`) for forks.
pub fn normalize_repository(payload: &RepositoryPayload) -> Repository {
    let owner = payload
        .owner
        .as_ref()
        .map(|o| o.login.clone())
        .filter(|login| !login.is_empty())
        .or_else(|| {
            payload
                .full_name
                .split_once('/')
                .map(|(owner, _)| owner.to_string())
        })
        .unwrap_or_default();

    let name = if payload.name.is_empty() {
        payload
            .full_name
            .split_once('/')
            .map(|(_, name)| name.to_string())
            .unwrap_or_default()
    } else {
        payload.name.clone()
    };

    let upstream = payload.source.as_deref().or(payload.parent.as_deref());

    Repository {
        owner,
        name,
        fullname: payload.full_name.clone(),
        url: payload.html_url.clone(),
        source: upstream.map(|s| Box::new(normalize_repository(s))),
    }
}

fn normalize_user(account: &AccountPayload) -> User {
    User {
        name: account.login.clone(),
        url: account.html_url.clone(),
    }
}

/// Map a provider item onto an [`Issue`] of the resolved repository.
///
/// The item itself is retained as `raw`.
pub fn normalize_issue(item: &ProviderItem, repository: &Repository) -> Issue {
    let payload = item.payload();

    let assignees: BTreeSet<User> = payload
        .assignees
        .iter()
        .flatten()
        .map(normalize_user)
        .collect();
    let labels: BTreeSet<String> = payload
        .labels
        .iter()
        .flatten()
        .map(|l| l.name.clone())
        .collect();

    Issue {
        id: payload.id,
        kind: item.kind(),
        state: IssueState::from_provider(&payload.state),
        number: payload.number,
        title: payload.title.clone(),
        author: payload.user.as_ref().map(normalize_user).unwrap_or_default(),
        assignees,
        labels,
        url: payload.html_url.clone(),
        created_at: payload.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        updated_at: payload.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        repository: repository.clone(),
        promoted: None,
        description: payload.body.clone().unwrap_or_default(),
        raw: Some(item.clone()),
    }
}

/// Extract `owner/name` from a repository API url such as
/// `https://api.github.com/repos/acme/widgets`.
pub fn repository_from_api_url(url: &str) -> Option<&str> {
    let (_, fullname) = url.split_once("/repos/")?;
    let fullname = fullname.trim_end_matches('/');
    fullname.contains('/').then_some(fullname)
}
