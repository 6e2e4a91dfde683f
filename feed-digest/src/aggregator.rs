use crate::state::{BatchOutcome, BatchState, RoundResult};
use crate::traits::SourceFetcher;
use crate::types::{FetchConfig, FetchError, Source};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Fans fetches out over the pending sources in rounds.
///
/// Every round dispatches one fetch per pending source with at most
/// `max_concurrency` in flight and a per-call deadline, then waits for the
/// whole round to settle before deciding what to retry. The batch ends when
/// nothing is pending or `max_rounds` rounds have run; it never fails.
pub struct RetryController {
    fetcher: Arc<dyn SourceFetcher>,
    config: FetchConfig,
}

impl RetryController {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, config: FetchConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub async fn run(&self, sources: &[Source], cutoff: DateTime<Utc>) -> BatchOutcome {
        self.run_batch(Uuid::new_v4(), sources, cutoff).await
    }

    /// Like [`run`](Self::run), tagging logs and the outcome with `batch_id`.
    pub async fn run_batch(
        &self,
        batch_id: Uuid,
        sources: &[Source],
        cutoff: DateTime<Utc>,
    ) -> BatchOutcome {
        let mut state = BatchState::new(batch_id, sources, cutoff);
        let span = info_span!("batch", batch_id = %state.batch_id());

        async {
            info!(sources = state.pending().len(), %cutoff, "Starting fetch batch");

            while !state.is_done(self.config.max_rounds) {
                let results = self.fetch_round(&state).await;
                state.complete_round(results);
            }

            let outcome = state.finish();
            info!(
                rounds = outcome.rounds,
                sources_with_news = outcome.digests.len(),
                items = outcome.total_items(),
                unresolved = outcome.unresolved.len(),
                "Fetching is done"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn fetch_round(&self, state: &BatchState) -> Vec<RoundResult> {
        let round = state.round() + 1;
        let cutoff = state.cutoff();
        let deadline = self.config.per_call_timeout();

        info!(round, pending = state.pending().len(), "Starting fetch round");

        stream::iter(state.pending_sources().map(|(index, source)| {
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                let result = match timeout(deadline, fetcher.fetch(source, cutoff)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(deadline)),
                };
                (index, result)
            }
        }))
        .buffer_unordered(self.config.max_concurrency.max(1))
        .collect()
        .await
    }
}
