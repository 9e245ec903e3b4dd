//! Best-effort content enrichment.
//!
//! [`Enricher`] fetches the page an entry links to and [`extract_main_text`]
//! pulls the article body out of it. Any failure yields
//! [`EnrichmentOutcome::Unavailable`] so the caller can fall back to the
//! feed-provided summary.

mod enricher;
mod extract;

pub use enricher::{Enricher, EnrichmentFailure, EnrichmentOutcome, EnrichmentStatus};
pub use extract::{extract_main_text, MAX_EXTRACTED_CHARS};
