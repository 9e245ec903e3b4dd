use crate::content::extract::extract_main_text;
use crate::util::{UrlPolicy, UrlRejected};
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Why an article page could not provide a body.
///
/// Never fatal: the normalizer falls back to the feed summary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnrichmentFailure {
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Not an HTML page: {0}")]
    NotHtml(String),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("No article text found on page")]
    EmptyExtraction,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlRejected),
}

/// Result of trying to enrich one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// Main-content text extracted from the article page
    Enriched(String),
    /// Enrichment is disabled
    Skipped,
    /// The page could not provide a body; content degrades to the summary
    Unavailable(EnrichmentFailure),
}

impl EnrichmentOutcome {
    pub fn body(&self) -> Option<&str> {
        match self {
            EnrichmentOutcome::Enriched(text) => Some(text),
            EnrichmentOutcome::Skipped | EnrichmentOutcome::Unavailable(_) => None,
        }
    }

    /// True when enrichment was attempted and failed.
    pub fn is_degraded(&self) -> bool {
        matches!(self, EnrichmentOutcome::Unavailable(_))
    }

    pub fn status(&self) -> EnrichmentStatus {
        match self {
            EnrichmentOutcome::Enriched(_) => EnrichmentStatus::Enriched,
            EnrichmentOutcome::Skipped => EnrichmentStatus::Skipped,
            EnrichmentOutcome::Unavailable(failure) => EnrichmentStatus::Degraded {
                reason: failure.to_string(),
            },
        }
    }
}

/// Serializable quality indicator attached to per-entry events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Enriched,
    Skipped,
    Degraded { reason: String },
}

/// Fetches linked article pages and extracts their main text.
#[derive(Clone)]
pub struct Enricher {
    client: reqwest::Client,
    timeout: Duration,
    policy: UrlPolicy,
    enabled: bool,
}

impl Enricher {
    pub fn new(client: reqwest::Client, timeout: Duration, policy: UrlPolicy) -> Self {
        Self {
            client,
            timeout,
            policy,
            enabled: true,
        }
    }

    /// An enricher that never touches the network.
    pub fn disabled(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: Duration::ZERO,
            policy: UrlPolicy::default(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Best-effort enrichment of one article link.
    ///
    /// Every failure is folded into [`EnrichmentOutcome::Unavailable`].
    pub async fn enrich(&self, url: &str) -> EnrichmentOutcome {
        if !self.enabled {
            return EnrichmentOutcome::Skipped;
        }

        match self.try_enrich(url).await {
            Ok(text) => EnrichmentOutcome::Enriched(text),
            Err(failure) => {
                tracing::debug!(url = %url, error = %failure, "Enrichment unavailable, falling back to summary");
                EnrichmentOutcome::Unavailable(failure)
            }
        }
    }

    async fn try_enrich(&self, url: &str) -> Result<String, EnrichmentFailure> {
        let target = self.policy.check(url)?;

        let html = tokio::time::timeout(self.timeout, self.fetch_page(target))
            .await
            .map_err(|_| EnrichmentFailure::Timeout)??;

        extract_main_text(&html).ok_or(EnrichmentFailure::EmptyExtraction)
    }

    async fn fetch_page(&self, url: Url) -> Result<String, EnrichmentFailure> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(network_failure)?;

        if !response.status().is_success() {
            return Err(EnrichmentFailure::HttpStatus(response.status().as_u16()));
        }

        // A missing Content-Type is given the benefit of the doubt
        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.to_ascii_lowercase().contains("html") {
                return Err(EnrichmentFailure::NotHtml(content_type.to_string()));
            }
        }

        read_limited_text(response, MAX_PAGE_SIZE).await
    }
}

fn network_failure(err: reqwest::Error) -> EnrichmentFailure {
    if err.is_timeout() {
        EnrichmentFailure::Timeout
    } else {
        EnrichmentFailure::Network(err.to_string())
    }
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, EnrichmentFailure> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(EnrichmentFailure::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(network_failure)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(EnrichmentFailure::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    // Pages in legacy charsets keep their ASCII text
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
