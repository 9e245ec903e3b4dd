use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database file is locked by another process
    #[error("Database is locked by another process")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, recognising SQLite lock conditions
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Write Outcomes
// ============================================================================

/// Result of inserting a new article
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row created with this id
    Inserted(i64),
    /// A row with the same url already exists
    ConstraintViolation,
}

/// Result of updating an article in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

// ============================================================================
// Rows
// ============================================================================

/// Internal row type for article queries (used by sqlx FromRow).
/// Timestamps are stored as Unix milliseconds.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub source: String,
    pub category: Option<String>,
    pub published_at: Option<i64>,
    pub scraped_at: i64,
}

impl ArticleRow {
    pub(crate) fn into_stored(self) -> StoredArticle {
        StoredArticle {
            id: self.id,
            url: self.url,
            title: self.title,
            content: self.content,
            summary: self.summary,
            author: self.author,
            source: self.source,
            category: self.category,
            published_at: self.published_at.map(from_millis),
            scraped_at: from_millis(self.scraped_at),
        }
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ============================================================================
// Data Structures
// ============================================================================

/// An article as read back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredArticle {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub source: String,
    pub category: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
}

/// Filters for read-side article listing.
///
/// Text filters are case-insensitive substring matches; `None` means
/// unfiltered. `from`/`to` bound `published_at` inclusively.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub source: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregate counts over the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleStats {
    pub total: i64,
    /// `(source, count)` ordered by count descending
    pub by_source: Vec<(String, i64)>,
    /// Articles scraped in the 24 hours before the reference time
    pub recent_24h: i64,
}
