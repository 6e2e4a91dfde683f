use crate::types::{FeedItem, FetchError, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Fetches one source and returns its items published after `cutoff`.
///
/// An empty list is a success ("nothing new"). Implementations must be safe
/// to call concurrently and repeatedly for the same source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source, cutoff: DateTime<Utc>) -> Result<Vec<FeedItem>, FetchError>;
}
