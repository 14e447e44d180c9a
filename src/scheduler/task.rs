use std::sync::Arc;
use thiserror::Error;

use super::SchedulerConfig;
use crate::feed::{parse_feed, FeedSource, FetchError, ParseError};
use crate::storage::{Feed, IngestStore, IngestSummary, NewPost, StoreError};

/// Why a single feed could not be refreshed during a tick.
///
/// These never escape the tick: they are logged and recorded in the report.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Failed to persist posts: {0}")]
    Store(#[from] StoreError),
    #[error("Feed task panicked: {0}")]
    Panicked(String),
}

/// A feed whose document was fetched, parsed and ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedFeed {
    pub channel_title: String,
    /// Entries found in the document
    pub entries: usize,
    pub summary: IngestSummary,
}

/// Outcome of one feed's task, handed to the tick aggregator exactly once.
#[derive(Debug)]
pub struct FeedOutcome {
    pub feed_id: i64,
    pub feed_name: String,
    pub url: String,
    pub result: Result<IngestedFeed, FeedError>,
}

impl FeedOutcome {
    pub(crate) fn panicked(feed_id: i64, feed_name: String, url: String, message: String) -> Self {
        Self {
            feed_id,
            feed_name,
            url,
            result: Err(FeedError::Panicked(message)),
        }
    }
}

/// Fetch, parse and ingest one feed.
///
/// `tick_start` becomes the feed's new `last_fetched_at` on success; on any
/// failure the store is left untouched for this feed.
pub(crate) async fn refresh_feed<S, F>(
    store: Arc<S>,
    source: Arc<F>,
    feed: Feed,
    config: SchedulerConfig,
    tick_start: i64,
) -> FeedOutcome
where
    S: IngestStore,
    F: FeedSource,
{
    let result = fetch_and_ingest(&*store, &*source, &feed, &config, tick_start).await;
    FeedOutcome {
        feed_id: feed.id,
        feed_name: feed.name,
        url: feed.url,
        result,
    }
}

async fn fetch_and_ingest<S, F>(
    store: &S,
    source: &F,
    feed: &Feed,
    config: &SchedulerConfig,
    tick_start: i64,
) -> Result<IngestedFeed, FeedError>
where
    S: IngestStore,
    F: FeedSource,
{
    let body = fetch_with_deadline(source, &feed.url, config).await?;
    let document = parse_feed(&body)?;

    let posts: Vec<NewPost> = document
        .entries
        .iter()
        .map(|entry| entry.to_new_post(feed.id))
        .collect();
    let summary = store.ingest(feed.id, &posts, tick_start).await?;

    Ok(IngestedFeed {
        channel_title: document.title,
        entries: posts.len(),
        summary,
    })
}

/// Fetch under the per-fetch deadline, retrying transient failures if configured.
///
/// Exceeding the deadline drops the in-flight request for this feed only.
async fn fetch_with_deadline<F: FeedSource>(
    source: &F,
    url: &str,
    config: &SchedulerConfig,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt: u32 = 0;

    loop {
        let result = match tokio::time::timeout(config.fetch_timeout, source.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                after: config.fetch_timeout,
            }),
        };

        match result {
            Ok(body) => return Ok(body),
            Err(e) if e.is_transient() && attempt < config.fetch_retries => {
                let delay = config
                    .retry_backoff
                    .saturating_mul(2u32.saturating_pow(attempt));
                tracing::warn!(
                    url = %url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient fetch failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
