use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
// Use the interfaces crate for the shared data model and collaborator contracts
pub use interfaces::defs::{Article, Credentials, DeliveryStatus, HistoryRecord, PushType, Source};
pub use interfaces::defs::{
    AuthProvider, DeliveryChannel, HistoryWriter, PushHistoryProvider, SourceListProvider,
    SummaryPublisher,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

/// New items found for one source in the current batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDigest {
    pub source: Source,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Deadline for a single source fetch, enforced by the retry controller.
    pub timeout_seconds: u64,
    pub max_concurrency: usize,
    /// First attempt plus retries.
    pub max_rounds: u32,
    pub max_items_per_source: usize,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl FetchConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Feed-Digest/1.0".to_string(),
            timeout_seconds: 8,
            max_concurrency: 15,
            max_rounds: 4,
            max_items_per_source: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

/// Per-source failure. Always recovered by the retry controller.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("Upstream {service} unavailable: {reason}")]
    Upstream { service: &'static str, reason: String },

    #[error("Delivery via {channel} failed: {reason}")]
    Delivery { channel: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DigestError {
    pub fn upstream(service: &'static str, error: anyhow::Error) -> Self {
        DigestError::Upstream {
            service,
            reason: format!("{error:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;
