//! Configuration file parser for `newswire.toml`.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as a warning since they are
//! usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::ingest::{DedupPolicy, FeedSource, IngestSettings};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Well-formed TOML with a value the pipeline cannot use.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// Display label; derived from the feed's hostname when absent.
    #[serde(default)]
    pub label: Option<String>,
    pub url: String,
}

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file path, or `:memory:`.
    pub database_path: String,

    /// Seconds between cycle starts.
    pub scrape_interval_secs: u64,

    /// Per-cycle entry cap per source, in feed order.
    pub max_articles_per_source: usize,

    pub fetch_timeout_secs: u64,
    pub enrich_timeout_secs: u64,
    pub cycle_deadline_secs: u64,
    pub dedup_policy: DedupPolicy,

    /// Fetch each linked article page for its full text.
    pub enrich: bool,

    pub max_concurrent_sources: usize,
    pub enrich_concurrency: usize,

    /// Retries of transient feed fetch failures within one cycle.
    pub fetch_retries: u32,

    /// First retry delay; doubled on each further attempt.
    pub retry_backoff_ms: u64,

    pub max_redirects: usize,
    pub user_agent: String,

    /// Permit loopback, link-local and private network targets.
    pub allow_private_hosts: bool,

    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "newswire.db".to_string(),
            scrape_interval_secs: 3600,
            max_articles_per_source: 50,
            fetch_timeout_secs: 30,
            enrich_timeout_secs: 15,
            cycle_deadline_secs: 900,
            dedup_policy: DedupPolicy::Skip,
            enrich: true,
            max_concurrent_sources: 4,
            enrich_concurrency: 4,
            fetch_retries: 2,
            retry_backoff_ms: 1000,
            max_redirects: 5,
            user_agent: concat!("newswire/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_private_hosts: false,
            sources: vec![
                SourceConfig {
                    label: Some("BBC News".to_string()),
                    url: "https://feeds.bbci.co.uk/news/rss.xml".to_string(),
                },
                SourceConfig {
                    label: Some("CNN".to_string()),
                    url: "https://rss.cnn.com/rss/edition.rss".to_string(),
                },
            ],
        }
    }
}

/// Upper bound for every duration key (30 days).
const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "scrape_interval_secs",
    "max_articles_per_source",
    "fetch_timeout_secs",
    "enrich_timeout_secs",
    "cycle_deadline_secs",
    "dedup_policy",
    "enrich",
    "max_concurrent_sources",
    "enrich_concurrency",
    "fetch_retries",
    "retry_backoff_ms",
    "max_redirects",
    "user_agent",
    "allow_private_hosts",
    "sources",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file, apply environment overrides and
    /// validate.
    ///
    /// - Missing file → defaults
    /// - Empty file → defaults
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid loading a huge file
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Apply `NEWSWIRE_DATABASE_PATH` and `NEWSWIRE_DEDUP_POLICY`.
    /// Environment values take precedence over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("NEWSWIRE_DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            tracing::debug!(path = %path, "Database path overridden from environment");
            self.database_path = path;
        }

        if let Some(policy) = lookup("NEWSWIRE_DEDUP_POLICY") {
            self.dedup_policy = policy
                .parse()
                .map_err(|e: String| ConfigError::Invalid(format!("NEWSWIRE_DEDUP_POLICY: {e}")))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("scrape_interval_secs", self.scrape_interval_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("enrich_timeout_secs", self.enrich_timeout_secs),
            ("cycle_deadline_secs", self.cycle_deadline_secs),
            ("max_articles_per_source", self.max_articles_per_source as u64),
            ("max_concurrent_sources", self.max_concurrent_sources as u64),
            ("enrich_concurrency", self.enrich_concurrency as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be greater than 0")));
            }
        }

        let durations = [
            ("scrape_interval_secs", self.scrape_interval_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("enrich_timeout_secs", self.enrich_timeout_secs),
            ("cycle_deadline_secs", self.cycle_deadline_secs),
            ("retry_backoff_ms", self.retry_backoff_ms / 1000),
        ];
        for (key, secs) in durations {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be at most {MAX_DURATION_SECS} seconds"
                )));
            }
        }

        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".to_string()));
        }

        for source in &self.sources {
            let url = Url::parse(source.url.trim()).map_err(|e| {
                ConfigError::Invalid(format!("source url '{}': {e}", source.url))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "source url '{}': only http and https are supported",
                    source.url
                )));
            }
        }

        Ok(())
    }

    /// Sources with labels resolved, in configuration order.
    pub fn feed_sources(&self) -> Vec<FeedSource> {
        self.sources
            .iter()
            .map(|s| {
                let url = s.url.trim();
                let label = s
                    .label
                    .as_deref()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| label_from_host(url));
                FeedSource::new(label, url)
            })
            .collect()
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            scrape_interval: Duration::from_secs(self.scrape_interval_secs),
            max_articles_per_source: self.max_articles_per_source,
            cycle_deadline: Duration::from_secs(self.cycle_deadline_secs),
            dedup_policy: self.dedup_policy,
            max_concurrent_sources: self.max_concurrent_sources,
            enrich_concurrency: self.enrich_concurrency,
            fetch_retries: self.fetch_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_secs(self.enrich_timeout_secs)
    }
}

/// `https://www.example.com/rss` → `Example.com`
fn label_from_host(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string());
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut chars = host.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
