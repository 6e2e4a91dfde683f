#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use feed_digest::{
    Collaborators, DeliveryChannel, DeliveryStatus, DigestJob, FeedItem, FetchError, HistoryRecord,
    HistoryWriter, JobConfig, PushHistoryProvider, Source, SourceFetcher, SourceListProvider,
    SummaryPublisher,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Serves the same canned response to every connection and returns its URL.
pub async fn serve(status_line: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Accepts connections and never answers.
pub async fn serve_silence() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}")
}

pub fn source(url: &str, title: &str, weight: f64) -> Source {
    Source {
        url: url.to_string(),
        title: title.to_string(),
        weight,
    }
}

pub fn local_time(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .earliest()
        .expect("valid local time")
}

/// What a scripted source does on a given attempt.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Items(usize),
    Empty,
    Fail,
    Hang,
}

/// In-memory fetcher following a per-URL script. The last step repeats.
pub struct ScriptedFetcher {
    scripts: HashMap<String, Vec<Step>>,
    latency: Duration,
    calls: Mutex<HashMap<String, u32>>,
    cutoffs: Mutex<Vec<DateTime<Utc>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            cutoffs: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn script(mut self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(url.to_string(), steps);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn seen_cutoffs(&self) -> Vec<DateTime<Utc>> {
        self.cutoffs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &Source, cutoff: DateTime<Utc>) -> Result<Vec<FeedItem>, FetchError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(source.url.clone()).or_insert(0);
            *count += 1;
            *count as usize
        };
        self.cutoffs.lock().unwrap().push(cutoff);

        let _guard = InFlight::enter(&self.in_flight, &self.peak);
        tokio::time::sleep(self.latency).await;

        let step = self
            .scripts
            .get(&source.url)
            .and_then(|steps| steps.get(attempt - 1).or(steps.last()))
            .copied()
            .unwrap_or(Step::Empty);

        match step {
            Step::Items(count) => Ok((0..count)
                .map(|i| FeedItem {
                    title: format!("{} post {}", source.title, i + 1),
                    link: format!("{}/post/{}", source.url, i + 1),
                    published: Some(cutoff + ChronoDuration::hours((count - i) as i64)),
                })
                .collect()),
            Step::Empty => Ok(Vec::new()),
            Step::Fail => Err(FetchError::Status(503)),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
        }
    }
}

pub struct StaticSources {
    pub sources: Vec<Source>,
    pub fail: bool,
}

#[async_trait]
impl SourceListProvider for StaticSources {
    async fn fetch_source_list(&self) -> anyhow::Result<Vec<Source>> {
        if self.fail {
            anyhow::bail!("source list backend is down");
        }
        Ok(self.sources.clone())
    }
}

/// Newest-first history kept in memory.
#[derive(Default)]
pub struct MemoryHistory {
    pub records: Mutex<Vec<HistoryRecord>>,
    pub writes: Mutex<Vec<HistoryRecord>>,
    pub fail_reads: bool,
}

impl MemoryHistory {
    pub fn with_records(records: Vec<HistoryRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<HistoryRecord> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushHistoryProvider for MemoryHistory {
    async fn fetch_push_history(&self, token: &str) -> anyhow::Result<Vec<HistoryRecord>> {
        if self.fail_reads {
            anyhow::bail!("history backend is down");
        }
        anyhow::ensure!(token == "test-token", "unexpected token {token}");
        Ok(self.records.lock().unwrap().clone())
    }
}

#[async_trait]
impl HistoryWriter for MemoryHistory {
    async fn insert_push_history(&self, record: &HistoryRecord, _token: &str) -> anyhow::Result<()> {
        self.records.lock().unwrap().insert(0, record.clone());
        self.writes.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub messages: Mutex<Vec<String>>,
    pub reject: bool,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_message(&self, text: &str) -> anyhow::Result<DeliveryStatus> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.reject {
            return Ok(DeliveryStatus::Rejected {
                status: 500,
                body: "webhook unavailable".to_string(),
            });
        }
        Ok(DeliveryStatus::Accepted)
    }
}

pub struct RecordingPublisher {
    pub url: String,
    pub published: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummaryPublisher for RecordingPublisher {
    async fn publish(&self, title_range: &str, content: &str) -> anyhow::Result<String> {
        self.published
            .lock()
            .unwrap()
            .push((title_range.to_string(), content.to_string()));
        Ok(self.url.clone())
    }
}

/// All collaborators of a [`DigestJob`], kept around for assertions.
pub struct Harness {
    pub sources: Arc<StaticSources>,
    pub history: Arc<MemoryHistory>,
    pub delivery: Arc<RecordingChannel>,
    pub log: Arc<RecordingChannel>,
    pub publisher: Arc<RecordingPublisher>,
    pub fetcher: Arc<ScriptedFetcher>,
}

impl Harness {
    pub fn new(sources: Vec<Source>, history: MemoryHistory, fetcher: ScriptedFetcher) -> Self {
        Self {
            sources: Arc::new(StaticSources {
                sources,
                fail: false,
            }),
            history: Arc::new(history),
            delivery: Arc::new(RecordingChannel::default()),
            log: Arc::new(RecordingChannel::default()),
            publisher: Arc::new(RecordingPublisher::new("https://github.com/acme/digests/issues/7")),
            fetcher: Arc::new(fetcher),
        }
    }

    pub fn job(&self) -> DigestJob {
        self.job_with(&JobConfig::default())
    }

    pub fn job_with(&self, config: &JobConfig) -> DigestJob {
        let collaborators = Collaborators {
            sources: self.sources.clone(),
            history: self.history.clone(),
            history_writer: self.history.clone(),
            delivery: self.delivery.clone(),
            log_channel: self.log.clone(),
            publisher: Some(self.publisher.clone() as Arc<dyn SummaryPublisher>),
        };
        DigestJob::new(collaborators, self.fetcher.clone(), config, "test-token".to_string())
    }
}
