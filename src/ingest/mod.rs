//! The ingestion pipeline.
//!
//! Per source: fetch → parse → (per entry) enrich → normalize → dedup →
//! persist. [`Scheduler`] drives cycles over all configured sources and
//! reports each as a [`CycleSummary`].
//!
//! Errors are contained where they arise. An entry-level failure becomes an
//! [`EntryOutcome::Failed`] and the source continues; a source-level failure
//! becomes a [`SourceStatus::Failed`] and the cycle continues.

mod dedup;
mod normalize;
mod outcome;
mod persist;
mod scheduler;
mod source;

pub use crate::article::Article;
pub use dedup::{decide, Classification, DedupPolicy, Deduplicator};
pub use normalize::{Normalizer, ValidationError, ValidationReason};
pub use outcome::{
    CycleSummary, EntryOutcome, IngestEvent, OutcomeCounts, SourceFailure, SourceOutcome,
    SourceStatus,
};
pub use persist::{PersistError, PersistOutcome, PersistenceGateway, SkipReason};
pub use scheduler::{IngestSettings, Scheduler, SchedulerError};
pub use source::FeedSource;
