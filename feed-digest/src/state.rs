use crate::types::{FeedItem, FetchError, Source, SourceDigest};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of one fetch attempt, keyed by the source's index in the registry.
pub type RoundResult = (usize, Result<Vec<FeedItem>, FetchError>);

/// Working state of a single batch.
///
/// The registry and cutoff are fixed when the batch starts. The pending set,
/// round counter and accumulator are only touched between rounds, after every
/// fetch of the round has settled.
#[derive(Debug)]
pub struct BatchState {
    batch_id: Uuid,
    cutoff: DateTime<Utc>,
    sources: Vec<Source>,
    pending: Vec<usize>,
    round: u32,
    accumulator: Vec<SourceDigest>,
}

impl BatchState {
    pub fn new(batch_id: Uuid, sources: &[Source], cutoff: DateTime<Utc>) -> Self {
        let sources = sources.to_vec();

        // A URL is pending at most once.
        let mut seen = HashSet::new();
        let pending = sources
            .iter()
            .enumerate()
            .filter(|(_, source)| seen.insert(source.url.clone()))
            .map(|(index, _)| index)
            .collect();

        Self {
            batch_id,
            cutoff,
            sources,
            pending,
            round: 0,
            accumulator: Vec::new(),
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn source(&self, index: usize) -> &Source {
        &self.sources[index]
    }

    pub fn pending(&self) -> &[usize] {
        &self.pending
    }

    pub fn pending_sources(&self) -> impl Iterator<Item = (usize, &Source)> + '_ {
        self.pending.iter().map(move |&index| (index, &self.sources[index]))
    }

    pub fn is_done(&self, max_rounds: u32) -> bool {
        self.pending.is_empty() || self.round >= max_rounds
    }

    /// Applies the settled results of one round and advances the round counter.
    pub fn complete_round(&mut self, results: Vec<RoundResult>) {
        self.round += 1;

        for (index, result) in results {
            if !self.pending.contains(&index) {
                continue;
            }
            let source = &self.sources[index];

            match result {
                Ok(items) => {
                    self.pending.retain(|&pending| pending != index);
                    if items.is_empty() {
                        info!(source = %source.title, round = self.round, "No new items");
                    } else {
                        info!(
                            source = %source.title,
                            round = self.round,
                            new_items = items.len(),
                            "Found new items"
                        );
                        self.accumulator.push(SourceDigest {
                            source: source.clone(),
                            items,
                        });
                    }
                }
                Err(e) => {
                    warn!(source = %source.title, url = %source.url, round = self.round, "Fetch failed: {}", e);
                }
            }
        }
    }

    /// Closes the batch, dropping sources that never succeeded.
    pub fn finish(self) -> BatchOutcome {
        let unresolved: Vec<Source> = self
            .pending
            .iter()
            .map(|&index| self.sources[index].clone())
            .collect();

        for source in &unresolved {
            warn!(
                source = %source.title,
                url = %source.url,
                rounds = self.round,
                "Giving up on source"
            );
        }

        let mut seen = HashSet::new();
        let mut digests = self.accumulator;
        digests.retain(|digest| seen.insert(digest.source.url.clone()));

        BatchOutcome {
            batch_id: self.batch_id,
            cutoff: self.cutoff,
            rounds: self.round,
            digests,
            unresolved,
        }
    }
}

/// Everything a finished batch produced.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub cutoff: DateTime<Utc>,
    pub rounds: u32,
    pub digests: Vec<SourceDigest>,
    pub unresolved: Vec<Source>,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.digests.iter().map(|digest| digest.items.len()).sum()
    }

    /// Orders the digests by descending source weight, keeping ties stable.
    pub fn sort_by_weight(&mut self) {
        self.digests
            .sort_by(|a, b| b.source.weight.total_cmp(&a.source.weight));
    }
}
