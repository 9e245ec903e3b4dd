//! The canonical article record produced by the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum stored URL length; longer URLs are rejected, never cut.
pub const MAX_URL_CHARS: usize = 1000;
pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_AUTHOR_CHARS: usize = 200;
pub const MAX_SOURCE_CHARS: usize = 200;
pub const MAX_CATEGORY_CHARS: usize = 100;

/// A normalized article, ready for deduplication and persistence.
///
/// `url` is the identity key: two stored records never share one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
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
