use crate::parser::{select_new_items, FeedParser};
use crate::traits::SourceFetcher;
use crate::types::{FeedItem, FetchConfig, FetchError, Result, Source};
use crate::utils;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// HTTP implementation of [`SourceFetcher`].
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    parser: FeedParser,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            parser: FeedParser::new(),
        })
    }

    pub async fn fetch_document(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        // Only http(s) feeds
        if !utils::url::is_valid_feed_url(url) {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let start_time = Instant::now();
        let response = self.client.get(url).send().await?;

        // Check response status
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // Check content length before downloading
        let limit = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(FetchError::FeedTooLarge {
                    size_mb: content_length as usize / (1024 * 1024),
                });
            }
        }

        // Servers may omit or understate Content-Length
        let bytes = response.bytes().await?;
        if bytes.len() > limit {
            return Err(FetchError::FeedTooLarge {
                size_mb: bytes.len() / (1024 * 1024),
            });
        }

        debug!(
            "Fetched {} ({} bytes in {}ms)",
            url,
            bytes.len(),
            start_time.elapsed().as_millis()
        );
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SourceFetcher for Fetcher {
    async fn fetch(
        &self,
        source: &Source,
        cutoff: DateTime<Utc>,
    ) -> std::result::Result<Vec<FeedItem>, FetchError> {
        let content = self.fetch_document(&source.url).await?;
        let items = self.parser.parse_items(&content)?;

        // Entries are newest first; keep only what is past the cutoff
        let fresh = select_new_items(&items, cutoff, self.config.max_items_per_source);

        info!(source = %source.title, new_items = fresh.len(), "Fetched source");
        Ok(fresh)
    }
}
