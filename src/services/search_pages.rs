//! Lazy pagination over provider search results.

use futures::stream::{self, Stream, TryStreamExt};

use crate::domain::errors::{ProviderError, ProviderResult};
use crate::domain::models::{IssuePayload, SearchPage, SearchQuery};
use crate::domain::ports::IssueProvider;

/// Upper bound on pages fetched for one query (the provider serves at most
/// 1000 results at 100 per page).
pub const MAX_SEARCH_PAGES: u32 = 10;

/// Stream the pages of `query`, starting at page 1, for as long as the
/// provider reports more results. The stream is finite and restartable:
/// calling this again re-runs the query from the first page.
pub fn search_pages<'a>(
    provider: &'a dyn IssueProvider,
    query: &'a SearchQuery,
) -> impl Stream<Item = ProviderResult<SearchPage>> + Send + 'a {
    stream::try_unfold(Some(1u32), move |next| async move {
        let Some(page) = next else {
            return Ok::<_, ProviderError>(None);
        };
        let result = provider.search(query, page).await?;
        let next = (result.has_more && page < MAX_SEARCH_PAGES).then_some(page + 1);
        Ok(Some((result, next)))
    })
}

/// Fetch every page of `query` and concatenate the items.
pub async fn collect_search(
    provider: &dyn IssueProvider,
    query: &SearchQuery,
) -> ProviderResult<Vec<IssuePayload>> {
    search_pages(provider, query)
        .try_fold(Vec::new(), |mut items, page| async move {
            items.extend(page.items);
            Ok(items)
        })
        .await
}
