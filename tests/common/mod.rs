//! Common test utilities for integration tests
//!
//! Provides a scripted issue provider, payload builders and a subscriber
//! that records every dispatched event.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use issue_mirror::domain::errors::{ProviderError, ProviderResult};
use issue_mirror::domain::models::{
    EventKind, Issue, IssuePayload, RepositoryPayload, SearchPage, SearchQuery, WebhookDelivery,
};
use issue_mirror::domain::ports::IssueProvider;
use issue_mirror::services::dispatcher::{callback, EventCallback};

/// Provider serving fixed repositories and scripted search results.
///
/// Queries requesting text matches are answered from the promotions script,
/// all others from the updates script.
#[derive(Default)]
pub struct FakeProvider {
    repositories: Mutex<HashMap<String, RepositoryPayload>>,
    updates: Mutex<Vec<IssuePayload>>,
    promotions: Mutex<Vec<IssuePayload>>,
    fail_promotions: AtomicBool,
    failing_fetches: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn with_repository(self, repository: RepositoryPayload) -> Self {
        self.repositories
            .lock()
            .unwrap()
            .insert(repository.full_name.clone(), repository);
        self
    }

    pub fn set_updates(&self, items: Vec<IssuePayload>) {
        *self.updates.lock().unwrap() = items;
    }

    pub fn set_promotions(&self, items: Vec<IssuePayload>) {
        *self.promotions.lock().unwrap() = items;
    }

    pub fn fail_promotions(&self, fail: bool) {
        self.fail_promotions.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` repository fetches with a 502.
    pub fn fail_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Rendered queries received so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueProvider for FakeProvider {
    async fn fetch_repository(&self, fullname: &str) -> ProviderResult<RepositoryPayload> {
        let failing = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(ProviderError::Http {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        self.repositories
            .lock()
            .unwrap()
            .get(fullname)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(fullname.to_string()))
    }

    async fn search(&self, query: &SearchQuery, _page: u32) -> ProviderResult<SearchPage> {
        self.queries.lock().unwrap().push(query.to_string());

        let items = if query.wants_text_matches() {
            if self.fail_promotions.load(Ordering::SeqCst) {
                return Err(ProviderError::Http {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
            self.promotions.lock().unwrap().clone()
        } else {
            self.updates.lock().unwrap().clone()
        };

        Ok(SearchPage {
            items,
            has_more: false,
        })
    }
}

/// Every `(kind, issues)` batch dispatched to a subscriber.
#[derive(Clone, Default)]
pub struct Collected(Arc<Mutex<Vec<(EventKind, Vec<Issue>)>>>);

impl Collected {
    pub fn callback(&self) -> EventCallback {
        let events = Arc::clone(&self.0);
        callback(move |kind, issues| {
            events.lock().unwrap().push((kind, issues.to_vec()));
        })
    }

    pub fn batches(&self) -> Vec<(EventKind, Vec<Issue>)> {
        self.0.lock().unwrap().clone()
    }

    /// `(kind, number)` for every dispatched issue, in dispatch order.
    pub fn flat(&self) -> Vec<(EventKind, u64)> {
        self.batches()
            .into_iter()
            .flat_map(|(kind, issues)| issues.into_iter().map(move |i| (kind, i.number)))
            .collect()
    }
}

pub fn repository(id: u64, fullname: &str, source: Option<RepositoryPayload>) -> RepositoryPayload {
    let (owner, name) = fullname.split_once('/').unwrap();
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "full_name": fullname,
        "html_url": format!("https://github.com/{fullname}"),
        "owner": { "login": owner },
        "fork": source.is_some(),
        "source": source,
    }))
    .unwrap()
}

/// Search item for `number` in `fullname`, authored by `author`.
pub fn search_item(
    fullname: &str,
    number: u64,
    state: &str,
    author: &str,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> IssuePayload {
    serde_json::from_value(json!({
        "id": 1000 + number,
        "number": number,
        "title": format!("Issue {number}"),
        "state": state,
        "user": { "login": author },
        "html_url": format!("https://github.com/{fullname}/issues/{number}"),
        "created_at": created_at,
        "updated_at": updated_at,
        "repository_url": format!("https://api.github.com/repos/{fullname}"),
    }))
    .unwrap()
}

/// Attach a promotion comment fragment, as returned with text matches.
pub fn with_comment(mut item: IssuePayload, fragment: &str) -> IssuePayload {
    item.text_matches = serde_json::from_value(json!([
        { "object_type": "IssueComment", "fragment": fragment }
    ]))
    .unwrap();
    item
}

/// Webhook body for issue `number` of `repository`, authored by alice.
pub fn delivery_body(
    action: &str,
    repository: &RepositoryPayload,
    number: u64,
    state: &str,
) -> serde_json::Value {
    json!({
        "action": action,
        "issue": {
            "id": 1000 + number,
            "number": number,
            "title": format!("Issue {number}"),
            "state": state,
            "user": { "login": "alice" },
            "html_url": format!("{}/issues/{number}", repository.html_url),
        },
        "repository": repository,
    })
}

pub fn delivery(event: &str, body: &serde_json::Value) -> WebhookDelivery {
    WebhookDelivery::parse(event, &serde_json::to_vec(body).unwrap()).unwrap()
}
