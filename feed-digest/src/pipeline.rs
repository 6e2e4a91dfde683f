use crate::aggregator::RetryController;
use crate::config::{CalendarConfig, JobConfig};
use crate::digest::DigestAssembler;
use crate::history::derive_cutoff;
use crate::state::BatchOutcome;
use crate::traits::SourceFetcher;
use crate::types::{
    Article, DeliveryChannel, DeliveryStatus, DigestError, HistoryRecord, HistoryWriter,
    PushHistoryProvider, PushType, Result, SourceListProvider, SummaryPublisher,
};
use crate::utils::time::week_range_title;
use chrono::{DateTime, Datelike, Local, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// External services the job talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Arc<dyn SourceListProvider>,
    pub history: Arc<dyn PushHistoryProvider>,
    pub history_writer: Arc<dyn HistoryWriter>,
    pub delivery: Arc<dyn DeliveryChannel>,
    pub log_channel: Arc<dyn DeliveryChannel>,
    pub publisher: Option<Arc<dyn SummaryPublisher>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    NoSources,
    SilentDay,
    Completed {
        rounds: u32,
        sources_with_news: usize,
        items: usize,
        recorded: bool,
    },
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub kind: PushType,
    pub cutoff: DateTime<Utc>,
    pub status: BatchStatus,
}

/// Last finished batch, kept for the delivery trigger.
#[derive(Debug, Clone)]
struct FinishedBatch {
    outcome: BatchOutcome,
}

#[derive(Debug, Default)]
struct JobState {
    sources_seen: bool,
    last_batch: Option<FinishedBatch>,
    weekly_url: Option<String>,
}

/// Fetch, assemble, record and deliver digests.
///
/// One batch runs per trigger. The job keeps the last finished batch so the
/// separate delivery trigger can send it later in the day.
pub struct DigestJob {
    collaborators: Collaborators,
    controller: RetryController,
    assembler: DigestAssembler,
    calendar: CalendarConfig,
    token: String,
    state: Mutex<JobState>,
}

impl DigestJob {
    pub fn new(
        collaborators: Collaborators,
        fetcher: Arc<dyn SourceFetcher>,
        config: &JobConfig,
        token: String,
    ) -> Self {
        Self {
            collaborators,
            controller: RetryController::new(fetcher, config.fetch.clone()),
            assembler: DigestAssembler::new(config.digest_index_url.clone()),
            calendar: config.calendar.clone(),
            token,
            state: Mutex::new(JobState::default()),
        }
    }

    pub async fn run_batch(&self, kind: PushType) -> Result<BatchReport> {
        self.run_batch_at(kind, Local::now()).await
    }

    /// Runs one batch as if triggered at `now`.
    pub async fn run_batch_at(&self, kind: PushType, now: DateTime<Local>) -> Result<BatchReport> {
        let batch_id = Uuid::new_v4();
        info!(%batch_id, %kind, "Batch triggered");

        // Both upstream reads must succeed before anything is fetched
        let (sources, history) = tokio::try_join!(
            async {
                self.collaborators
                    .sources
                    .fetch_source_list()
                    .await
                    .map_err(|e| DigestError::upstream("source list", e))
            },
            async {
                self.collaborators
                    .history
                    .fetch_push_history(&self.token)
                    .await
                    .map_err(|e| DigestError::upstream("push history", e))
            },
        )
        .map_err(|e| {
            error!(%batch_id, "Batch aborted: {}", e);
            e
        })?;

        let cutoff = derive_cutoff(&history, kind, now.with_timezone(&Utc), self.calendar.lookback);
        let report = |status| BatchReport {
            batch_id,
            kind,
            cutoff,
            status,
        };

        info!(%batch_id, sources = sources.len(), %cutoff, "Loaded source list");
        // No source list, no delivery later either
        if sources.is_empty() {
            return Ok(report(BatchStatus::NoSources));
        }
        self.state.lock().await.sources_seen = true;

        if self.calendar.is_silent(now.weekday()) {
            info!(%batch_id, "Silent day, not fetching");
            return Ok(report(BatchStatus::SilentDay));
        }

        // Fetch rounds; individual source failures never surface here
        let mut outcome = self.controller.run_batch(batch_id, &sources, cutoff).await;
        outcome.sort_by_weight();

        let rounds = outcome.rounds;
        let sources_with_news = outcome.digests.len();
        let items = outcome.total_items();
        let recorded = if outcome.is_empty() {
            info!(%batch_id, "No new articles in this batch");
            false
        } else {
            self.finalize(kind, now, &outcome).await
        };

        self.state.lock().await.last_batch = Some(FinishedBatch { outcome });

        Ok(report(BatchStatus::Completed {
            rounds,
            sources_with_news,
            items,
            recorded,
        }))
    }

    /// Publishes, logs and records a non-empty batch. Returns whether the
    /// history write succeeded.
    async fn finalize(&self, kind: PushType, now: DateTime<Local>, outcome: &BatchOutcome) -> bool {
        let is_weekly_day = self.calendar.is_weekly_day(now.weekday());
        let weekly_url = self.state.lock().await.weekly_url.clone();
        let message = self.assembler.assemble(
            &outcome.digests,
            outcome.total_items(),
            is_weekly_day,
            weekly_url.as_deref(),
        );

        // Weekly summary first so its URL is known for later deliveries
        if kind == PushType::Weekly && is_weekly_day {
            self.publish_weekly(now, &message).await;
        }

        if let Err(e) = self.collaborators.log_channel.send_message(&message).await {
            warn!("Log channel {} failed: {:#}", self.collaborators.log_channel.name(), e);
        }

        // Record the digest; the next cutoff is derived from this
        let record = HistoryRecord {
            kind,
            time: now.with_timezone(&Utc),
            content: message,
            articles: outcome
                .digests
                .iter()
                .flat_map(|digest| digest.items.iter())
                .map(|item| Article {
                    title: item.title.clone(),
                    link: item.link.clone(),
                })
                .collect(),
        };

        match self
            .collaborators
            .history_writer
            .insert_push_history(&record, &self.token)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to record push history: {:#}", e);
                false
            }
        }
    }

    async fn publish_weekly(&self, now: DateTime<Local>, message: &str) {
        let Some(publisher) = &self.collaborators.publisher else {
            return;
        };

        match publisher.publish(&week_range_title(now.date_naive()), message).await {
            Ok(url) => {
                info!("Weekly summary available at {}", url);
                self.state.lock().await.weekly_url = Some(url);
            }
            Err(e) => error!("Failed to publish weekly summary: {:#}", e),
        }
    }

    pub async fn deliver(&self) -> Result<Option<DeliveryStatus>> {
        self.deliver_at(Local::now()).await
    }

    /// Sends the last finished batch, if it found anything.
    ///
    /// Returns `Ok(None)` when there was nothing to send. Delivery failures
    /// are reported once and never retried.
    pub async fn deliver_at(&self, now: DateTime<Local>) -> Result<Option<DeliveryStatus>> {
        let (outcome, weekly_url) = {
            let state = self.state.lock().await;
            if !state.sources_seen || self.calendar.is_silent(now.weekday()) {
                return Ok(None);
            }
            match &state.last_batch {
                Some(batch) if !batch.outcome.is_empty() => {
                    (batch.outcome.clone(), state.weekly_url.clone())
                }
                _ => return Ok(None),
            }
        };

        // Re-assemble so a weekly URL published since the batch is included
        let message = self.assembler.assemble(
            &outcome.digests,
            outcome.total_items(),
            self.calendar.is_weekly_day(now.weekday()),
            weekly_url.as_deref(),
        );

        let channel = self.collaborators.delivery.name().to_string();
        match self.collaborators.delivery.send_message(&message).await {
            Ok(DeliveryStatus::Accepted) => {
                info!(%channel, batch_id = %outcome.batch_id, "Digest delivered");
                Ok(Some(DeliveryStatus::Accepted))
            }
            Ok(DeliveryStatus::Rejected { status, body }) => Err(DigestError::Delivery {
                channel,
                reason: format!("status {}: {}", status, body),
            }),
            Err(e) => Err(DigestError::Delivery {
                channel,
                reason: format!("{:#}", e),
            }),
        }
    }

    /// Id of the last batch that reached the fetch stage.
    pub async fn last_batch_id(&self) -> Option<Uuid> {
        self.state
            .lock()
            .await
            .last_batch
            .as_ref()
            .map(|batch| batch.outcome.batch_id)
    }

    pub async fn weekly_url(&self) -> Option<String> {
        self.state.lock().await.weekly_url.clone()
    }
}
