use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One syndicated feed endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushType {
    Daily,
    Weekly,
}

impl PushType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushType::Daily => "daily",
            PushType::Weekly => "weekly",
        }
    }
}

impl fmt::Display for PushType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(PushType::Daily),
            "weekly" => Ok(PushType::Weekly),
            other => Err(anyhow::anyhow!("unknown push type: {other}")),
        }
    }
}

/// A digest that has already been generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "type")]
    pub kind: PushType,
    #[serde(deserialize_with = "history_time::deserialize")]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub articles: Vec<Article>,
}

/// Parses a history timestamp.
///
/// Accepts RFC 3339 and the backend's older `YYYY-MM-DD HH:MM:SS` form, which
/// carries no offset and is read as local time.
pub fn parse_history_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, history_time::LEGACY_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid history time {raw:?}: {e}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|time| time.with_timezone(&Utc))
        .ok_or_else(|| anyhow::anyhow!("history time {raw:?} does not exist locally"))
}

mod history_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, de::Error};

    pub(super) const LEGACY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_history_time(&raw).map_err(D::Error::custom)
    }
}

pub struct Credentials {
    pub user_name: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Accepted,
    Rejected { status: u16, body: String },
}

// Object style note:
// The collaborators below are thin I/O wrappers. Everything that decides
// *what* gets fetched, filtered or sent lives on the caller's side, so an
// implementation should do one request and report what happened.

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<String>;
}

#[async_trait]
pub trait SourceListProvider: Send + Sync {
    async fn fetch_source_list(&self) -> Result<Vec<Source>>;
}

/// History is returned newest first.
#[async_trait]
pub trait PushHistoryProvider: Send + Sync {
    async fn fetch_push_history(&self, token: &str) -> Result<Vec<HistoryRecord>>;
}

#[async_trait]
pub trait HistoryWriter: Send + Sync {
    async fn insert_push_history(&self, record: &HistoryRecord, token: &str) -> Result<()>;
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send_message(&self, text: &str) -> Result<DeliveryStatus>;
}

/// Publishes a weekly summary somewhere browsable and returns its URL.
#[async_trait]
pub trait SummaryPublisher: Send + Sync {
    async fn publish(&self, title_range: &str, content: &str) -> Result<String>;
}
