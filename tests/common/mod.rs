//! Shared fixtures for the integration tests: feed documents, an in-memory
//! feed source and a pinned clock.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rssagg::feed::{FeedSource, FetchError};
use rssagg::scheduler::{Clock, SchedulerConfig};
use rssagg::storage::{Database, Feed};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

/// Create a user and one feed per URL, returning the feeds in creation order.
pub async fn seed_feeds(db: &Database, urls: &[String]) -> Vec<Feed> {
    let user = db.create_user("subscriber").await.unwrap();
    let mut feeds = Vec::new();
    for (i, url) in urls.iter().enumerate() {
        feeds.push(
            db.create_feed(user.id, &format!("Feed {i}"), url)
                .await
                .unwrap(),
        );
    }
    feeds
}

/// RSS document with `count` items whose guids are `{prefix}-{n}`.
pub fn rss_with_items(prefix: &str, count: usize) -> String {
    let items: String = (0..count)
        .map(|n| {
            format!(
                "<item><guid>{prefix}-{n}</guid><title>{prefix} item {n}</title>\
                 <link>https://example.com/{prefix}/{n}</link>\
                 <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{prefix}</title>{items}</channel></rss>"#
    )
}

pub fn fast_config(batch_size: u32) -> SchedulerConfig {
    SchedulerConfig {
        batch_size,
        tick_interval: Duration::from_millis(20),
        fetch_timeout: Duration::from_secs(5),
        fetch_retries: 0,
        retry_backoff: Duration::from_millis(1),
    }
}

/// Clock pinned to a settable instant.
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(timestamp: i64) -> Self {
        Self(AtomicI64::new(timestamp))
    }

    pub fn set(&self, timestamp: i64) {
        self.0.store(timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0.load(Ordering::SeqCst), 0).unwrap()
    }
}

/// How the [`MemorySource`] answers one URL.
#[derive(Clone)]
pub enum Reply {
    Body(String),
    Status(u16),
    Panic,
}

/// In-process feed source with per-URL replies and delays.
///
/// Tracks how many fetches are running so tests can observe overlap.
#[derive(Default)]
pub struct MemorySource {
    replies: Mutex<HashMap<String, (Duration, Reply)>>,
    pub in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl MemorySource {
    pub fn reply(&self, url: &str, delay: Duration, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), (delay, reply));
    }
}

impl FeedSource for MemorySource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let (delay, reply) = self
            .replies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or((Duration::ZERO, Reply::Status(404)));

        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Body(body) => Ok(body.into_bytes()),
            Reply::Status(status) => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            Reply::Panic => panic!("source exploded for {url}"),
        }
    }
}
