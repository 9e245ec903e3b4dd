use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use tokio::time::Instant;

use super::normalize::Normalizer;
use super::outcome::{EntryOutcome, IngestEvent, OutcomeCounts, SourceFailure, SourceOutcome, SourceStatus};
use super::scheduler::Scheduler;
use crate::content::EnrichmentOutcome;
use crate::feed::{parse_feed, FeedEntry, FetchError, FetchedDocument};

/// A configured feed with its resolved display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSource {
    pub label: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Where a source is within one cycle. Terminal states are reported through
/// [`SourceStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SourceState {
    #[default]
    Pending,
    Fetching,
    Parsing,
    Processing,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Pending => "pending",
            SourceState::Fetching => "fetching",
            SourceState::Parsing => "parsing",
            SourceState::Processing => "processing",
        };
        f.write_str(name)
    }
}

/// Progress of one source, kept outside the source future so it survives
/// abandonment at the cycle deadline.
#[derive(Debug, Default)]
struct SourceTally {
    state: SourceState,
    counts: OutcomeCounts,
    degraded: usize,
}

impl SourceTally {
    fn advance(&mut self, label: &str, next: SourceState) {
        tracing::trace!(source = %label, from = %self.state, to = %next, "Source state change");
        self.state = next;
    }
}

impl Scheduler {
    /// Run one source to a terminal state, or abandon it at `deadline`.
    pub(super) async fn run_source(
        &self,
        source: &FeedSource,
        scraped_at: DateTime<Utc>,
        deadline: Instant,
    ) -> SourceOutcome {
        let mut tally = SourceTally::default();

        let result = tokio::time::timeout_at(
            deadline,
            self.process_source(source, scraped_at, deadline, &mut tally),
        )
        .await;

        let status = match result {
            Ok(Ok(())) => {
                tracing::info!(
                    source = %source.label,
                    inserted = tally.counts.inserted,
                    updated = tally.counts.updated,
                    skipped = tally.counts.skipped,
                    failed = tally.counts.failed,
                    degraded = tally.degraded,
                    "Source done"
                );
                SourceStatus::Done
            }
            Ok(Err(failure)) => {
                tracing::warn!(source = %source.label, url = %source.url, error = %failure, "Source failed");
                SourceStatus::Failed(failure)
            }
            Err(_) => {
                tracing::warn!(
                    source = %source.label,
                    state = %tally.state,
                    processed = tally.counts.total(),
                    "Source abandoned at cycle deadline"
                );
                SourceStatus::Failed(SourceFailure::DeadlineExceeded)
            }
        };

        let outcome = SourceOutcome {
            label: source.label.clone(),
            feed_url: source.url.clone(),
            status,
            counts: tally.counts,
            degraded: tally.degraded,
        };
        self.emit(IngestEvent::SourceFinished(outcome.clone()));
        outcome
    }

    async fn process_source(
        &self,
        source: &FeedSource,
        scraped_at: DateTime<Utc>,
        deadline: Instant,
        tally: &mut SourceTally,
    ) -> Result<(), SourceFailure> {
        tally.advance(&source.label, SourceState::Fetching);
        let document = self.fetch_with_retry(source, deadline).await?;

        tally.advance(&source.label, SourceState::Parsing);
        let feed = parse_feed(&document.body)?;
        tracing::debug!(
            source = %source.label,
            entries = feed.raw_len(),
            bytes = document.body.len(),
            "Feed parsed"
        );

        tally.advance(&source.label, SourceState::Processing);
        let normalizer = Normalizer::new(&source.label, scraped_at);
        let enricher = &self.enricher;

        // Page fetches overlap; results are consumed in feed order
        let mut enriched = stream::iter(feed.entries().take(self.settings.max_articles_per_source))
            .map(|entry| async move {
                let enrichment = enricher.enrich(&entry.link).await;
                (entry, enrichment)
            })
            .buffered(self.settings.enrich_concurrency.max(1));

        while let Some((entry, enrichment)) = enriched.next().await {
            let outcome = self.ingest_entry(&normalizer, &entry, &enrichment).await;

            tally.counts.record(&outcome);
            if enrichment.is_degraded() {
                tally.degraded += 1;
            }

            match &outcome {
                EntryOutcome::Failed { reason } => {
                    tracing::warn!(source = %source.label, url = %entry.link, reason = %reason, "Entry failed");
                }
                other => {
                    tracing::debug!(source = %source.label, url = %entry.link, outcome = ?other, "Entry processed");
                }
            }

            self.emit(IngestEvent::Entry {
                source: source.label.clone(),
                url: entry.link.clone(),
                outcome,
                enrichment: enrichment.status(),
            });
        }

        Ok(())
    }

    /// Normalize, classify and persist one entry. Never fails: every error
    /// becomes [`EntryOutcome::Failed`].
    async fn ingest_entry(
        &self,
        normalizer: &Normalizer,
        entry: &FeedEntry,
        enrichment: &EnrichmentOutcome,
    ) -> EntryOutcome {
        let article = match normalizer.normalize(entry, enrichment) {
            Ok(article) => article,
            Err(e) => {
                return EntryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let classification = match self.dedup.classify(&article).await {
            Ok(classification) => classification,
            Err(e) => {
                return EntryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        match self.gateway.apply(classification, &article).await {
            Ok(outcome) => outcome.into(),
            Err(e) => EntryOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Fetch the feed, retrying transient failures with exponential backoff.
    ///
    /// A retry whose backoff would end past `deadline` is not attempted; the
    /// last error is returned instead.
    async fn fetch_with_retry(
        &self,
        source: &FeedSource,
        deadline: Instant,
    ) -> Result<FetchedDocument, FetchError> {
        let mut attempt: u32 = 0;
        let mut backoff = self.settings.retry_backoff;

        loop {
            match self.fetcher.fetch(&source.url).await {
                Ok(document) => return Ok(document),
                Err(e) if e.is_transient() && attempt < self.settings.fetch_retries => {
                    match Instant::now().checked_add(backoff) {
                        Some(resume) if resume < deadline => {}
                        _ => return Err(e),
                    }
                    attempt += 1;
                    tracing::info!(
                        source = %source.label,
                        attempt,
                        max_retries = self.settings.fetch_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying feed fetch"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
