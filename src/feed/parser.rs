use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use thiserror::Error;

use crate::util::{collapse_whitespace, html_to_text, truncate_chars};

/// Length of the summary derived from an entry's body when the feed supplies
/// no explicit summary.
const DERIVED_SUMMARY_CHARS: usize = 200;

/// Failure to parse a feed document as a whole.
///
/// Individual broken entries never produce this error; they are either
/// dropped (no link) or passed on and rejected by the normalizer.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed feed document: {0}")]
    MalformedDocument(String),
}

/// One candidate entry, pre-normalization.
///
/// Strings are extracted verbatim apart from HTML stripping; trimming,
/// truncation and validation happen in the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub link: String,
    pub title: String,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// A parsed feed document whose entries are converted on demand.
#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    entries: Vec<Entry>,
}

impl ParsedFeed {
    /// Number of raw entries in the document, including ones without a link.
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// Lazily converts the document's entries in feed order, dropping
    /// entries that carry no usable link.
    pub fn entries(self) -> impl Iterator<Item = FeedEntry> {
        self.entries.into_iter().filter_map(convert_entry)
    }
}

/// Parse RSS 0.9x/1.0/2.0, Atom or JSON Feed bytes.
///
/// # Errors
///
/// Returns [`ParseError::MalformedDocument`] only when the outer document
/// structure cannot be parsed.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed = parser::parse(bytes).map_err(|e| ParseError::MalformedDocument(e.to_string()))?;

    Ok(ParsedFeed {
        title: feed
            .title
            .map(|t| collapse_whitespace(&t.content))
            .filter(|t| !t.is_empty()),
        entries: feed.entries,
    })
}

fn convert_entry(entry: Entry) -> Option<FeedEntry> {
    // Prefer an alternate link, which is the article page in Atom feeds
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty());

    let Some(link) = link else {
        tracing::debug!(entry_id = %entry.id, "Dropping feed entry without a link");
        return None;
    };

    let title = entry
        .title
        .map(|t| html_to_text(&t.content))
        .unwrap_or_default();

    let summary = entry
        .summary
        .map(|s| html_to_text(&s.content))
        .filter(|s| !s.is_empty())
        .or_else(|| {
            entry
                .content
                .and_then(|c| c.body)
                .map(|body| html_to_text(&body))
                .filter(|text| !text.is_empty())
                .map(|text| derive_summary(&text))
        });

    let author = entry
        .authors
        .into_iter()
        .map(|p| p.name.trim().to_string())
        .find(|name| !name.is_empty());

    let category = entry.categories.into_iter().find_map(|c| {
        let term = c.term.trim();
        if !term.is_empty() {
            Some(term.to_string())
        } else {
            c.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())
        }
    });

    Some(FeedEntry {
        link,
        title,
        summary,
        author,
        category,
        published: entry.published.or(entry.updated),
    })
}

fn derive_summary(text: &str) -> String {
    if text.chars().count() > DERIVED_SUMMARY_CHARS {
        format!("{}...", truncate_chars(text, DERIVED_SUMMARY_CHARS))
    } else {
        text.to_string()
    }
}
