use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::dedup::{DedupPolicy, Deduplicator};
use super::outcome::{CycleSummary, IngestEvent, OutcomeCounts};
use super::persist::PersistenceGateway;
use super::source::FeedSource;
use crate::content::Enricher;
use crate::feed::Fetcher;
use crate::storage::Database;

/// Stand-in for "no limit" when a configured duration overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("An ingestion cycle is already in progress")]
    CycleInProgress,
}

/// Knobs for one scheduler. Fetch and enrichment timeouts live on the
/// [`Fetcher`] and [`Enricher`] themselves.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub scrape_interval: Duration,
    pub max_articles_per_source: usize,
    pub cycle_deadline: Duration,
    pub dedup_policy: DedupPolicy,
    pub max_concurrent_sources: usize,
    pub enrich_concurrency: usize,
    pub fetch_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            scrape_interval: Duration::from_secs(3600),
            max_articles_per_source: 50,
            cycle_deadline: Duration::from_secs(900),
            dedup_policy: DedupPolicy::Skip,
            max_concurrent_sources: 4,
            enrich_concurrency: 4,
            fetch_retries: 2,
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

/// Drives ingestion cycles over a fixed set of sources.
///
/// Owns the only interval timer. At most one cycle runs at a time; a second
/// [`run_one_cycle`](Self::run_one_cycle) call while one is active returns
/// [`SchedulerError::CycleInProgress`].
///
/// ```rust,ignore
/// let scheduler = Scheduler::new(&db, sources, settings, fetcher, enricher)
///     .with_events(tx);
///
/// let summary = scheduler.run_one_cycle().await?;
/// scheduler.run(tokio::signal::ctrl_c().map(|_| ())).await;
/// ```
pub struct Scheduler {
    pub(super) sources: Vec<FeedSource>,
    pub(super) settings: IngestSettings,
    pub(super) fetcher: Fetcher,
    pub(super) enricher: Enricher,
    pub(super) dedup: Deduplicator,
    pub(super) gateway: PersistenceGateway,
    events: Option<mpsc::Sender<IngestEvent>>,
    in_progress: AtomicBool,
}

impl Scheduler {
    pub fn new(
        db: &Database,
        sources: Vec<FeedSource>,
        settings: IngestSettings,
        fetcher: Fetcher,
        enricher: Enricher,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(db, settings.dedup_policy),
            gateway: PersistenceGateway::new(db),
            sources,
            settings,
            fetcher,
            enricher,
            events: None,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Publish per-entry, per-source and per-cycle events to `tx`.
    ///
    /// Delivery never blocks the pipeline: events that do not fit in the
    /// channel are dropped.
    pub fn with_events(mut self, tx: mpsc::Sender<IngestEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run every source once and summarize.
    ///
    /// Sources run concurrently up to `max_concurrent_sources`. Sources still
    /// running at the cycle deadline are abandoned and reported as failed;
    /// whatever they already wrote stays written.
    pub async fn run_one_cycle(&self) -> Result<CycleSummary, SchedulerError> {
        let _guard = CycleGuard::acquire(&self.in_progress).ok_or(SchedulerError::CycleInProgress)?;

        let started_at = Utc::now();
        let now = Instant::now();
        let deadline = now
            .checked_add(self.settings.cycle_deadline)
            .unwrap_or_else(|| now + FAR_FUTURE);
        tracing::info!(sources = self.sources.len(), "Ingestion cycle started");

        let sources: Vec<_> = stream::iter(&self.sources)
            .map(|source| self.run_source(source, started_at, deadline))
            .buffered(self.settings.max_concurrent_sources.max(1))
            .collect()
            .await;

        let mut totals = OutcomeCounts::default();
        for source in &sources {
            totals += source.counts;
        }

        let summary = CycleSummary {
            started_at,
            finished_at: Utc::now(),
            sources,
            totals,
        };

        tracing::info!(
            inserted = totals.inserted,
            updated = totals.updated,
            skipped = totals.skipped,
            failed = totals.failed,
            failed_sources = summary.failed_sources(),
            elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
            "Ingestion cycle finished"
        );
        self.emit(IngestEvent::CycleFinished(summary.clone()));

        Ok(summary)
    }

    /// Run a cycle immediately, then one per `scrape_interval`, until
    /// `shutdown` resolves.
    ///
    /// Cycles are awaited inline so they never overlap; a cycle that
    /// outlasts the interval swallows the missed ticks. Shutdown mid-cycle
    /// abandons the cycle.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = self.settings.scrape_interval.clamp(Duration::from_secs(1), FAR_FUTURE);
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.settings.scrape_interval.as_secs(),
            sources = self.sources.len(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {
                    tokio::select! {
                        result = self.run_one_cycle() => {
                            if let Err(e) = result {
                                tracing::warn!(error = %e, "Skipping scheduled cycle");
                            }
                        }
                        _ = &mut shutdown => {
                            tracing::warn!("Shutdown requested mid-cycle, abandoning it");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }

    pub(super) fn emit(&self, event: IngestEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                tracing::debug!(error = %e, "Dropping ingest event");
            }
        }
    }
}

/// Holds the in-progress flag for the life of one cycle, including when the
/// cycle future is dropped.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
