use chrono::{DateTime, Utc};

use super::task::{FeedError, FeedOutcome, IngestedFeed};

/// A feed that failed during a tick.
#[derive(Debug)]
pub struct FeedFailure {
    pub feed_id: i64,
    pub url: String,
    pub error: FeedError,
}

/// Aggregated result of one tick, built after every task has terminated.
#[derive(Debug)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub feeds_selected: usize,
    pub tasks_spawned: usize,
    pub ingested: Vec<(i64, IngestedFeed)>,
    pub failures: Vec<FeedFailure>,
}

impl TickReport {
    pub(crate) fn new(started_at: DateTime<Utc>, feeds_selected: usize) -> Self {
        Self {
            started_at,
            feeds_selected,
            tasks_spawned: 0,
            ingested: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, outcome: FeedOutcome) {
        match outcome.result {
            Ok(ingested) => {
                tracing::debug!(
                    feed_id = outcome.feed_id,
                    feed = %outcome.feed_name,
                    entries = ingested.entries,
                    inserted = ingested.summary.inserted,
                    duplicates = ingested.summary.duplicates,
                    "Feed refreshed"
                );
                self.ingested.push((outcome.feed_id, ingested));
            }
            Err(error) => {
                tracing::warn!(
                    feed_id = outcome.feed_id,
                    feed = %outcome.feed_name,
                    url = %outcome.url,
                    error = %error,
                    "Feed refresh failed"
                );
                self.failures.push(FeedFailure {
                    feed_id: outcome.feed_id,
                    url: outcome.url,
                    error,
                });
            }
        }
    }

    /// Every spawned task produced exactly one recorded outcome.
    pub fn is_complete(&self) -> bool {
        self.ingested.len() + self.failures.len() == self.tasks_spawned
    }

    pub fn posts_inserted(&self) -> usize {
        self.ingested.iter().map(|(_, f)| f.summary.inserted).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.ingested.iter().map(|(_, f)| f.summary.duplicates).sum()
    }

    pub fn entry_failures(&self) -> usize {
        self.ingested.iter().map(|(_, f)| f.summary.failed).sum()
    }

    pub fn failed_feed_ids(&self) -> Vec<i64> {
        self.failures.iter().map(|f| f.feed_id).collect()
    }

    pub fn ingested_feed_ids(&self) -> Vec<i64> {
        self.ingested.iter().map(|(id, _)| *id).collect()
    }

    pub(crate) fn log_summary(&self) {
        tracing::info!(
            feeds = self.feeds_selected,
            succeeded = self.ingested.len(),
            failed = self.failures.len(),
            inserted = self.posts_inserted(),
            duplicates = self.duplicates(),
            entry_failures = self.entry_failures(),
            "Tick complete"
        );
    }
}
