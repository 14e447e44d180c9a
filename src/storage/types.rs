use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the SQLite-backed feed and post stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row already exists (unique constraint on feed URL, follow or post guid)
    #[error("Record already exists")]
    Duplicate,

    /// The referenced row does not exist or is not owned by the caller
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Input rejected before reaching the database
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, mapping unique violations to [`StoreError::Duplicate`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate;
            }
        }
        StoreError::Database(err)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A subscribed feed.
///
/// `last_fetched_at` is `None` until the first successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub created_at: i64,
}

/// A persisted feed entry.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

/// A post waiting to be inserted, keyed by `(feed_id, guid)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    /// Unix seconds; `None` when the entry carried no usable publish date
    pub published_at: Option<i64>,
}

/// Counts produced by ingesting one feed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Entries written as new posts
    pub inserted: usize,
    /// Entries skipped because the post already existed
    pub duplicates: usize,
    /// Entries whose insert failed for a reason other than duplication
    pub failed: usize,
}

impl IngestSummary {
    pub fn attempted(&self) -> usize {
        self.inserted + self.duplicates + self.failed
    }
}
