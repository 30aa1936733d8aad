//! Ports between the sync core and the outside world.

use async_trait::async_trait;

use super::errors::{ProviderResult, SinkResult};
use super::models::{Issue, IssueRef, RepositoryPayload, SearchPage, SearchQuery};

/// Read access to the issue provider.
///
/// Implementations perform no retries; a failed call is reported to the
/// caller, which logs it and moves on.
#[async_trait]
pub trait IssueProvider: Send + Sync {
    /// Fetch a repository by `owner/name`
    ///
    /// # Returns
    /// * `Ok(payload)` including fork `source`/`parent` when present
    /// * `Err(ProviderError::NotFound)` if the repository does not exist
    async fn fetch_repository(&self, fullname: &str) -> ProviderResult<RepositoryPayload>;

    /// Run one page of an issue search
    ///
    /// # Arguments
    /// * `query` - The search query
    /// * `page` - 1-based page number
    async fn search(&self, query: &SearchQuery, page: u32) -> ProviderResult<SearchPage>;
}

/// Workspace mirror keyed by `(repository fullname, number)`.
#[async_trait]
pub trait WorkspaceMirror: Send + Sync {
    /// Create a record for the issue
    async fn create(&self, issue: &Issue) -> SinkResult<()>;

    /// Replace the record at `target` with `issue`
    ///
    /// # Returns
    /// * `Ok(true)` if a record existed and was replaced
    /// * `Ok(false)` if there was no record at `target`
    async fn update(&self, target: &IssueRef, issue: &Issue) -> SinkResult<bool>;

    /// Remove the record at `target`, returning whether one existed
    async fn delete(&self, target: &IssueRef) -> SinkResult<bool>;

    async fn find(&self, target: &IssueRef) -> SinkResult<Option<Issue>>;
}

/// Ticket tracker that receives newly created issues.
#[async_trait]
pub trait TicketTracker: Send + Sync {
    async fn create_ticket(&self, issue: &Issue) -> SinkResult<()>;
}
