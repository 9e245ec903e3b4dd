use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::persist::PersistError;
use crate::article::Article;
use crate::storage::Database;

/// What to do with an article whose url is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupPolicy {
    /// Leave the stored record untouched
    #[default]
    Skip,
    /// Refresh the stored record's fields and bump `scraped_at`
    RefreshOnReingest,
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(DedupPolicy::Skip),
            "refresh-on-reingest" => Ok(DedupPolicy::RefreshOnReingest),
            other => Err(format!(
                "unknown dedup policy '{other}' (expected 'skip' or 'refresh-on-reingest')"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    UnchangedDuplicate,
    UpdateCandidate,
}

/// Classify by existence alone. Identity is the exact url string.
pub fn decide(existing: bool, policy: DedupPolicy) -> Classification {
    match (existing, policy) {
        (false, _) => Classification::New,
        (true, DedupPolicy::Skip) => Classification::UnchangedDuplicate,
        (true, DedupPolicy::RefreshOnReingest) => Classification::UpdateCandidate,
    }
}

/// Looks articles up by url and classifies them under a fixed policy.
#[derive(Clone)]
pub struct Deduplicator {
    db: Database,
    policy: DedupPolicy,
}

impl Deduplicator {
    pub fn new(db: &Database, policy: DedupPolicy) -> Self {
        Self {
            db: db.clone(),
            policy,
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    pub async fn classify(&self, article: &Article) -> Result<Classification, PersistError> {
        let existing = self.db.find_by_url(&article.url).await?.is_some();
        Ok(decide(existing, self.policy))
    }
}
