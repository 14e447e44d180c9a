use super::schema::{now_timestamp, Database};
use super::types::{Feed, StoreError};

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Create a feed owned by `user_id` and subscribe the owner to it.
    ///
    /// Both rows are written in one transaction. A URL that is already
    /// registered yields [`StoreError::Duplicate`].
    pub async fn create_feed(&self, user_id: i64, name: &str, url: &str) -> Result<Feed, StoreError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(StoreError::InvalidInput(
                "feed name and url must not be empty".into(),
            ));
        }

        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::NotFound("user")
            }
            e => StoreError::from_sqlx(e),
        })?;

        sqlx::query("INSERT INTO feed_follows (user_id, feed_id, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(feed.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(feed_id = feed.id, user_id = user_id, url = %feed.url, "Created feed");
        Ok(feed)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("feed"))
    }

    pub async fn list_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let feeds =
            sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(feeds)
    }

    /// Select up to `limit` feeds, never-fetched first, then stalest first.
    pub async fn next_feeds_to_fetch(&self, limit: u32) -> Result<Vec<Feed>, StoreError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT ?
        "#
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Advance `last_fetched_at` to `fetched_at`.
    ///
    /// The marker never moves backwards: an older timestamp leaves the row
    /// untouched. Unknown feeds yield [`StoreError::NotFound`].
    pub async fn mark_feed_fetched(&self, feed_id: i64, fetched_at: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        mark_fetched_in(&mut tx, feed_id, fetched_at).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Staleness update shared by [`Database::mark_feed_fetched`] and ingestion.
pub(crate) async fn mark_fetched_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    feed_id: i64,
    fetched_at: i64,
) -> Result<(), StoreError> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM feeds WHERE id = ?")
        .bind(feed_id)
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(StoreError::NotFound("feed"));
    }

    sqlx::query(
        r#"
        UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1
        WHERE id = ?2 AND (last_fetched_at IS NULL OR last_fetched_at < ?1)
    "#,
    )
    .bind(fetched_at)
    .bind(feed_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
