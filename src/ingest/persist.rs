use serde::Serialize;
use thiserror::Error;

use super::dedup::Classification;
use crate::article::Article;
use crate::storage::{Database, DatabaseError, InsertOutcome, UpdateOutcome};

/// A store failure other than a url collision. Entry-level: counted as
/// failed.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already stored and the policy says leave it
    Duplicate,
    /// Another writer inserted the same url between lookup and insert
    ConcurrentDuplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    Inserted,
    Updated,
    Skipped(SkipReason),
}

/// Applies dedup classifications to the store, one article at a time.
#[derive(Clone)]
pub struct PersistenceGateway {
    db: Database,
}

impl PersistenceGateway {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    pub async fn apply(
        &self,
        classification: Classification,
        article: &Article,
    ) -> Result<PersistOutcome, PersistError> {
        match classification {
            Classification::New => self.insert(article).await,
            Classification::UnchangedDuplicate => Ok(PersistOutcome::Skipped(SkipReason::Duplicate)),
            Classification::UpdateCandidate => {
                match self.db.update_by_url(&article.url, article).await? {
                    UpdateOutcome::Updated => Ok(PersistOutcome::Updated),
                    UpdateOutcome::NotFound => {
                        tracing::debug!(url = %article.url, "Row vanished before update, inserting instead");
                        self.insert(article).await
                    }
                }
            }
        }
    }

    async fn insert(&self, article: &Article) -> Result<PersistOutcome, PersistError> {
        match self.db.insert_article(article).await? {
            InsertOutcome::Inserted(_) => Ok(PersistOutcome::Inserted),
            InsertOutcome::ConstraintViolation => {
                tracing::debug!(url = %article.url, "Concurrent insert detected, skipping");
                Ok(PersistOutcome::Skipped(SkipReason::ConcurrentDuplicate))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn article(title: &str) -> Article {
        Article {
            url: "https://example.com/a".to_string(),
            title: title.to_string(),
            content: None,
            summary: Some("summary".to_string()),
            author: None,
            source: "Example".to_string(),
            category: None,
            published_at: None,
            scraped_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_new_inserts() {
        let db = Database::open(":memory:").await.unwrap();
        let gateway = PersistenceGateway::new(&db);

        let outcome = gateway
            .apply(Classification::New, &article("A"))
            .await
            .unwrap();
        assert_eq!(outcome, PersistOutcome::Inserted);
        assert!(db.find_by_url("https://example.com/a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_new_classification_downgrades_to_skip() {
        let db = Database::open(":memory:").await.unwrap();
        let gateway = PersistenceGateway::new(&db);

        // Both writers classified the url as new before either inserted it
        gateway
            .apply(Classification::New, &article("first"))
            .await
            .unwrap();
        let outcome = gateway
            .apply(Classification::New, &article("second"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PersistOutcome::Skipped(SkipReason::ConcurrentDuplicate)
        );
        let stored = db.find_by_url("https://example.com/a").await.unwrap().unwrap();
        assert_eq!(stored.title, "first");
    }

    #[tokio::test]
    async fn test_unchanged_duplicate_is_noop() {
        let db = Database::open(":memory:").await.unwrap();
        let gateway = PersistenceGateway::new(&db);

        let outcome = gateway
            .apply(Classification::UnchangedDuplicate, &article("A"))
            .await
            .unwrap();
        assert_eq!(outcome, PersistOutcome::Skipped(SkipReason::Duplicate));
        assert!(db.find_by_url("https://example.com/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_candidate_refreshes_row() {
        let db = Database::open(":memory:").await.unwrap();
        let gateway = PersistenceGateway::new(&db);
        let original = article("Old");
        gateway.apply(Classification::New, &original).await.unwrap();

        let mut refreshed = article("New");
        refreshed.scraped_at = original.scraped_at + Duration::minutes(5);
        let outcome = gateway
            .apply(Classification::UpdateCandidate, &refreshed)
            .await
            .unwrap();

        assert_eq!(outcome, PersistOutcome::Updated);
        let stored = db.find_by_url(&refreshed.url).await.unwrap().unwrap();
        assert_eq!(stored.title, "New");
        assert!(stored.scraped_at > original.scraped_at);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_inserts() {
        let db = Database::open(":memory:").await.unwrap();
        let gateway = PersistenceGateway::new(&db);

        let outcome = gateway
            .apply(Classification::UpdateCandidate, &article("A"))
            .await
            .unwrap();
        assert_eq!(outcome, PersistOutcome::Inserted);
    }
}
