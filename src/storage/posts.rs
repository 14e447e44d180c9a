use super::feeds::mark_fetched_in;
use super::schema::{now_timestamp, Database};
use super::types::{IngestSummary, NewPost, Post, StoreError};

/// Maximum number of posts returned by any single listing query
const MAX_POSTS: i64 = 500;

const POST_COLUMNS: &str =
    "p.id, p.feed_id, p.guid, p.title, p.url, p.description, p.published_at, p.created_at";

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a single post, returning its id.
    ///
    /// An existing `(feed_id, guid)` pair yields [`StoreError::Duplicate`].
    pub async fn insert_post(&self, post: &NewPost) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO posts (feed_id, guid, title, url, description, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.guid)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now_timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(row.0)
    }

    /// Store a fetched document's posts and advance the feed's staleness marker.
    ///
    /// Runs as one transaction: each post is attempted once, duplicates are
    /// counted and skipped, and a failing insert is logged and skipped without
    /// aborting the rest. If marking the feed or committing fails, nothing is
    /// kept and the feed stays due.
    pub async fn ingest_posts(
        &self,
        feed_id: i64,
        posts: &[NewPost],
        fetched_at: i64,
    ) -> Result<IngestSummary, StoreError> {
        let now = now_timestamp();
        let mut summary = IngestSummary::default();
        let mut tx = self.pool.begin().await?;

        for post in posts {
            // SQLite rolls back only the failed statement, the transaction stays usable
            let result = sqlx::query(
                r#"
                INSERT INTO posts (feed_id, guid, title, url, description, published_at, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(feed_id, guid) DO NOTHING
            "#,
            )
            .bind(feed_id)
            .bind(&post.guid)
            .bind(&post.title)
            .bind(&post.url)
            .bind(&post.description)
            .bind(post.published_at)
            .bind(now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() > 0 => summary.inserted += 1,
                Ok(_) => summary.duplicates += 1,
                Err(e) => {
                    tracing::warn!(
                        feed_id = feed_id,
                        guid = %post.guid,
                        error = %e,
                        "Failed to insert post, skipping entry"
                    );
                    summary.failed += 1;
                }
            }
        }

        mark_fetched_in(&mut tx, feed_id, fetched_at).await?;
        tx.commit().await?;

        tracing::debug!(
            feed_id = feed_id,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "Ingested feed document"
        );
        Ok(summary)
    }

    /// Posts of one feed, newest publish time first.
    pub async fn posts_for_feed(&self, feed_id: i64, limit: i64) -> Result<Vec<Post>, StoreError> {
        let limit = limit.clamp(1, MAX_POSTS);
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p
            WHERE p.feed_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#
        ))
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Posts from every feed `user_id` follows, newest publish time first.
    ///
    /// Posts without a known publish time sort after dated ones.
    pub async fn posts_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, StoreError> {
        let limit = limit.clamp(1, MAX_POSTS);
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}
