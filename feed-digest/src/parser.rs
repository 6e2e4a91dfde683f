use crate::types::{FeedItem, FetchError};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use tracing::debug;

/// Parses RSS/Atom documents into [`FeedItem`]s, keeping document order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_items(&self, content: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| FetchError::Parse(format!("Failed to parse feed: {}", e)))?;

        let items: Vec<FeedItem> = feed.entries.into_iter().map(Self::parse_entry).collect();

        debug!("Parsed feed with {} entries", items.len());
        Ok(items)
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> FeedItem {
        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .unwrap_or_else(|| "Untitled".to_string());

        // An entry without a link still takes part in the cutoff scan.
        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();

        FeedItem {
            title,
            link,
            published: entry.published.or(entry.updated),
        }
    }
}

/// Collects the newest items published strictly after `cutoff`.
///
/// Items are expected newest first. The scan stops at the first item that is
/// not after the cutoff (or has no date), even if older-positioned items would
/// qualify on their own. At most `cap` items are returned.
pub fn select_new_items(items: &[FeedItem], cutoff: DateTime<Utc>, cap: usize) -> Vec<FeedItem> {
    items
        .iter()
        .take_while(|item| item.published.is_some_and(|published| published > cutoff))
        .take(cap)
        .cloned()
        .collect()
}
