//! Periodic feed refresh.
//!
//! Each tick selects a batch of due feeds, refreshes them concurrently (one
//! spawned task per feed) and waits for every task before the tick ends. The
//! loop awaits each tick inline, so ticks never overlap and a feed can't be
//! fetched twice at once.
//!
//! ```ignore
//! let scheduler = Scheduler::new(Arc::new(db), Arc::new(fetcher), config.scheduler_config());
//! scheduler.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//! ```

mod report;
mod task;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::feed::FeedSource;
use crate::storage::{IngestStore, StoreError};

pub use report::{FeedFailure, TickReport};
pub use task::{FeedError, FeedOutcome, IngestedFeed};

/// Errors that abort a whole tick. Per-feed failures never end up here.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The feed store could not return a batch
    #[error("Failed to select due feeds: {0}")]
    BatchSelection(#[source] StoreError),
}

/// Source of the tick start time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum feeds selected per tick
    pub batch_size: u32,
    pub tick_interval: Duration,
    /// Deadline applied to every fetch attempt
    pub fetch_timeout: Duration,
    /// Extra attempts for transient fetch failures within the same tick
    pub fetch_retries: u32,
    /// First retry delay, doubled on each further attempt
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            tick_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(30),
            fetch_retries: 0,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Drives the fetch-and-ingest cycle over a store and a feed source.
pub struct Scheduler<S, F> {
    store: Arc<S>,
    source: Arc<F>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl<S, F> Scheduler<S, F>
where
    S: IngestStore,
    F: FeedSource,
{
    pub fn new(store: Arc<S>, source: Arc<F>, config: SchedulerConfig) -> Self {
        Self {
            store,
            source,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the wall clock, mainly so tests can pin the tick start time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run ticks on the configured interval until `shutdown` resolves.
    ///
    /// The first tick starts immediately. A tick in progress when `shutdown`
    /// resolves is finished before returning. Returns the number of ticks run.
    pub async fn run<Fut>(&self, shutdown: Fut) -> u64
    where
        Fut: Future<Output = ()>,
    {
        let mut timer = tokio::time::interval(self.config.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.config.tick_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Feed worker started"
        );

        let mut ticks = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {}
            }

            ticks += 1;
            match self.run_tick().await {
                Ok(report) => report.log_summary(),
                Err(e) => tracing::error!(error = %e, "Tick aborted"),
            }
        }

        tracing::info!(ticks = ticks, "Feed worker stopped");
        ticks
    }

    /// Select one batch, refresh every feed in it concurrently and wait for all of them.
    ///
    /// Only a failure to select the batch is returned as an error; each feed's
    /// failure is isolated to that feed and recorded in the [`TickReport`].
    pub async fn run_tick(&self) -> Result<TickReport, SchedulerError> {
        let started_at = self.clock.now();
        let tick_start = started_at.timestamp();

        let feeds = self
            .store
            .list_due_feeds(self.config.batch_size)
            .await
            .map_err(SchedulerError::BatchSelection)?;

        let mut report = TickReport::new(started_at, feeds.len());
        if feeds.is_empty() {
            tracing::debug!("No feeds due");
            return Ok(report);
        }

        tracing::debug!(feeds = feeds.len(), "Refreshing batch");

        let mut tasks = JoinSet::new();
        for feed in feeds {
            let store = Arc::clone(&self.store);
            let source = Arc::clone(&self.source);
            let config = self.config.clone();

            tasks.spawn(async move {
                let (feed_id, feed_name, url) = (feed.id, feed.name.clone(), feed.url.clone());
                AssertUnwindSafe(task::refresh_feed(store, source, feed, config, tick_start))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(
                            feed_id = feed_id,
                            url = %url,
                            panic = %message,
                            "Feed task panicked"
                        );
                        FeedOutcome::panicked(feed_id, feed_name, url, message)
                    })
            });
        }
        report.tasks_spawned = tasks.len();

        // Drain every task: the tick is not over while any feed is in flight
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => tracing::error!(error = %e, "Feed task did not complete"),
            }
        }

        Ok(report)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
