use super::schema::{now_timestamp, Database};
use super::types::{FeedFollow, StoreError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("user name must not be empty".into()));
        }

        let now = now_timestamp();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = user.id, name = %user.name, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("user"))
    }

    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Subscribe `user_id` to `feed_id`.
    ///
    /// Returns [`StoreError::Duplicate`] if the user already follows the feed and
    /// [`StoreError::NotFound`] if either side does not exist.
    pub async fn follow_feed(&self, user_id: i64, feed_id: i64) -> Result<FeedFollow, StoreError> {
        let result = sqlx::query_as::<_, FeedFollow>(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at)
            VALUES (?, ?, ?)
            RETURNING id, user_id, feed_id, created_at
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now_timestamp())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(follow) => Ok(follow),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(StoreError::NotFound("user or feed"))
            }
            Err(e) => Err(StoreError::from_sqlx(e)),
        }
    }

    /// Remove a follow. Only the owning user may delete it.
    pub async fn unfollow_feed(&self, user_id: i64, follow_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE id = ? AND user_id = ?")
            .bind(follow_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("feed follow"));
        }
        Ok(())
    }

    pub async fn list_follows(&self, user_id: i64) -> Result<Vec<FeedFollow>, StoreError> {
        let follows = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT id, user_id, feed_id, created_at
            FROM feed_follows
            WHERE user_id = ?
            ORDER BY created_at, id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }
}
