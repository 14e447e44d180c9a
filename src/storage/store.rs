//! Store seams used by the ingestion scheduler.
//!
//! The scheduler only needs a handful of operations from persistence, so it
//! depends on these traits rather than on [`Database`] directly. Tests plug in
//! instrumented stores through the same seams.

use std::future::Future;

use super::schema::Database;
use super::types::{Feed, IngestSummary, NewPost, StoreError};

/// Feed selection and staleness tracking.
pub trait FeedStore: Send + Sync + 'static {
    /// Up to `limit` feeds, never-fetched first, then oldest `last_fetched_at` first.
    fn list_due_feeds(&self, limit: u32)
        -> impl Future<Output = Result<Vec<Feed>, StoreError>> + Send;

    /// Advance the feed's `last_fetched_at` (Unix seconds).
    fn mark_fetched(
        &self,
        feed_id: i64,
        fetched_at: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Post persistence.
pub trait PostStore: Send + Sync + 'static {
    /// Insert one post. An existing `(feed_id, guid)` yields [`StoreError::Duplicate`].
    fn insert_post(&self, post: &NewPost) -> impl Future<Output = Result<i64, StoreError>> + Send;
}

/// The ingestion step: persist a document's posts, then mark the feed fetched.
pub trait IngestStore: FeedStore + PostStore {
    /// Attempt every post once and advance the feed's staleness marker.
    ///
    /// The default inserts posts one by one and marks the feed only when no
    /// insert failed for a reason other than duplication. Transactional stores
    /// override it to make the whole step atomic.
    fn ingest(
        &self,
        feed_id: i64,
        posts: &[NewPost],
        fetched_at: i64,
    ) -> impl Future<Output = Result<IngestSummary, StoreError>> + Send {
        async move {
            let mut summary = IngestSummary::default();
            let mut first_error = None;

            for post in posts {
                match self.insert_post(post).await {
                    Ok(_) => summary.inserted += 1,
                    Err(StoreError::Duplicate) => summary.duplicates += 1,
                    Err(e) => {
                        tracing::warn!(
                            feed_id = feed_id,
                            guid = %post.guid,
                            error = %e,
                            "Failed to insert post, skipping entry"
                        );
                        summary.failed += 1;
                        first_error.get_or_insert(e);
                    }
                }
            }

            // Without a transaction, leave the feed due so lost entries get another try
            if let Some(e) = first_error {
                return Err(e);
            }

            self.mark_fetched(feed_id, fetched_at).await?;
            Ok(summary)
        }
    }
}

impl FeedStore for Database {
    async fn list_due_feeds(&self, limit: u32) -> Result<Vec<Feed>, StoreError> {
        self.next_feeds_to_fetch(limit).await
    }

    async fn mark_fetched(&self, feed_id: i64, fetched_at: i64) -> Result<(), StoreError> {
        self.mark_feed_fetched(feed_id, fetched_at).await
    }
}

impl PostStore for Database {
    async fn insert_post(&self, post: &NewPost) -> Result<i64, StoreError> {
        Database::insert_post(self, post).await
    }
}

impl IngestStore for Database {
    async fn ingest(
        &self,
        feed_id: i64,
        posts: &[NewPost],
        fetched_at: i64,
    ) -> Result<IngestSummary, StoreError> {
        self.ingest_posts(feed_id, posts, fetched_at).await
    }
}
