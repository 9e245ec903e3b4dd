//! Outcome values reported by an ingestion cycle.
//!
//! Every error in the pipeline ends up here as data: per-entry
//! [`EntryOutcome`]s roll up into per-source [`OutcomeCounts`], and sources
//! roll up into one [`CycleSummary`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::AddAssign;
use thiserror::Error;

use super::persist::{PersistOutcome, SkipReason};
use crate::content::EnrichmentStatus;
use crate::feed::{FetchError, ParseError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::Inserted => self.inserted += 1,
            EntryOutcome::Updated => self.updated += 1,
            EntryOutcome::Skipped { .. } => self.skipped += 1,
            EntryOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.skipped + self.failed
    }
}

impl AddAssign for OutcomeCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// What happened to one feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EntryOutcome {
    Inserted,
    Updated,
    Skipped { reason: SkipReason },
    /// Validation or store failure; the entry is dropped for this cycle
    Failed { reason: String },
}

impl From<PersistOutcome> for EntryOutcome {
    fn from(outcome: PersistOutcome) -> Self {
        match outcome {
            PersistOutcome::Inserted => EntryOutcome::Inserted,
            PersistOutcome::Updated => EntryOutcome::Updated,
            PersistOutcome::Skipped(reason) => EntryOutcome::Skipped { reason },
        }
    }
}

/// Why a whole source produced nothing (more) this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFailure {
    #[error("Feed request timed out")]
    Timeout,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("HTTP error: status {status}")]
    HttpError { status: u16 },
    #[error("Too many redirects")]
    TooManyRedirects,
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("Feed response too large")]
    ResponseTooLarge,
    #[error("Invalid feed URL: {message}")]
    InvalidUrl { message: String },
    #[error("Malformed feed: {message}")]
    MalformedDocument { message: String },
    #[error("Abandoned at cycle deadline")]
    DeadlineExceeded,
}

impl From<FetchError> for SourceFailure {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout => SourceFailure::Timeout,
            FetchError::ConnectionRefused(_) => SourceFailure::ConnectionRefused,
            FetchError::HttpStatus(status) => SourceFailure::HttpError { status },
            FetchError::TooManyRedirects => SourceFailure::TooManyRedirects,
            FetchError::ResponseTooLarge => SourceFailure::ResponseTooLarge,
            FetchError::InvalidUrl(rejected) => SourceFailure::InvalidUrl {
                message: rejected.to_string(),
            },
            other @ (FetchError::Network(_) | FetchError::IncompleteResponse { .. }) => {
                SourceFailure::Network {
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<ParseError> for SourceFailure {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedDocument(message) => SourceFailure::MalformedDocument { message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    Done,
    Failed(SourceFailure),
}

impl SourceStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub label: String,
    pub feed_url: String,
    pub status: SourceStatus,
    pub counts: OutcomeCounts,
    /// Entries whose enrichment was attempted and failed
    pub degraded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceOutcome>,
    pub totals: OutcomeCounts,
}

impl CycleSummary {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.status.is_failed()).count()
    }

    pub fn source(&self, label: &str) -> Option<&SourceOutcome> {
        self.sources.iter().find(|s| s.label == label)
    }
}

/// Progress events published while a cycle runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    Entry {
        source: String,
        url: String,
        outcome: EntryOutcome,
        enrichment: EnrichmentStatus,
    },
    SourceFinished(SourceOutcome),
    CycleFinished(CycleSummary),
}
