use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::article::{
    Article, MAX_AUTHOR_CHARS, MAX_CATEGORY_CHARS, MAX_SOURCE_CHARS, MAX_TITLE_CHARS,
    MAX_URL_CHARS,
};
use crate::content::EnrichmentOutcome;
use crate::feed::FeedEntry;
use crate::util::{strip_control_chars, truncate_chars};

/// An entry that cannot become an [`Article`].
///
/// Entry-level: the entry is dropped and counted as failed, the source
/// carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: ValidationReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    Empty,
    TooLong { max: usize },
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationReason::Empty => write!(f, "is empty"),
            ValidationReason::TooLong { max } => write!(f, "exceeds {max} characters"),
        }
    }
}

impl ValidationError {
    fn empty(field: &'static str) -> Self {
        Self {
            field,
            reason: ValidationReason::Empty,
        }
    }
}

/// Maps feed entries of one source into canonical articles.
///
/// One normalizer is built per source per cycle so every article it produces
/// shares the cycle's `scraped_at`.
#[derive(Debug, Clone)]
pub struct Normalizer {
    source: String,
    scraped_at: DateTime<Utc>,
}

impl Normalizer {
    pub fn new(source_label: &str, scraped_at: DateTime<Utc>) -> Self {
        Self {
            source: clean(source_label, Some(MAX_SOURCE_CHARS)).unwrap_or_default(),
            scraped_at,
        }
    }

    /// Build an [`Article`] from a feed entry and its enrichment outcome.
    ///
    /// Enriched text wins over the feed summary for `content`; the summary is
    /// always kept in `summary`. Over-long optional fields and titles are cut
    /// to their limit. An over-long url is an error, since a cut url would
    /// point somewhere else.
    pub fn normalize(
        &self,
        entry: &FeedEntry,
        enrichment: &EnrichmentOutcome,
    ) -> Result<Article, ValidationError> {
        let url = entry.link.trim();
        if url.is_empty() {
            return Err(ValidationError::empty("url"));
        }
        if url.chars().count() > MAX_URL_CHARS {
            return Err(ValidationError {
                field: "url",
                reason: ValidationReason::TooLong { max: MAX_URL_CHARS },
            });
        }

        let title =
            clean(&entry.title, Some(MAX_TITLE_CHARS)).ok_or(ValidationError::empty("title"))?;

        if self.source.is_empty() {
            return Err(ValidationError::empty("source"));
        }

        let summary = entry.summary.as_deref().and_then(|s| clean(s, None));
        let content = enrichment
            .body()
            .and_then(|body| clean(body, None))
            .or_else(|| summary.clone());

        Ok(Article {
            url: url.to_string(),
            title,
            content,
            summary,
            author: entry
                .author
                .as_deref()
                .and_then(|a| clean(a, Some(MAX_AUTHOR_CHARS))),
            source: self.source.clone(),
            category: entry
                .category
                .as_deref()
                .and_then(|c| clean(c, Some(MAX_CATEGORY_CHARS))),
            published_at: entry.published,
            scraped_at: self.scraped_at,
        })
    }
}

/// Strip control characters, trim, then cut to `max` chars.
/// `None` when nothing is left.
fn clean(raw: &str, max: Option<usize>) -> Option<String> {
    let stripped = strip_control_chars(raw);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cut = match max {
        Some(max) => truncate_chars(trimmed, max),
        None => trimmed.into(),
    };
    Some(cut.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::EnrichmentFailure;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn scraped_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn entry() -> FeedEntry {
        FeedEntry {
            link: "  https://example.com/story  ".to_string(),
            title: "Story title".to_string(),
            summary: Some("Short summary".to_string()),
            author: Some("Jane Reporter".to_string()),
            category: Some("World".to_string()),
            published: Some(Utc.with_ymd_and_hms(2024, 2, 29, 18, 0, 0).unwrap()),
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new("BBC News", scraped_at())
    }

    #[test]
    fn test_enriched_content_preferred() {
        let article = normalizer()
            .normalize(
                &entry(),
                &EnrichmentOutcome::Enriched("Full body".to_string()),
            )
            .unwrap();

        assert_eq!(
            article,
            Article {
                url: "https://example.com/story".to_string(),
                title: "Story title".to_string(),
                content: Some("Full body".to_string()),
                summary: Some("Short summary".to_string()),
                author: Some("Jane Reporter".to_string()),
                source: "BBC News".to_string(),
                category: Some("World".to_string()),
                published_at: entry().published,
                scraped_at: scraped_at(),
            }
        );
    }

    #[test]
    fn test_failed_enrichment_falls_back_to_summary() {
        let article = normalizer()
            .normalize(
                &entry(),
                &EnrichmentOutcome::Unavailable(EnrichmentFailure::Timeout),
            )
            .unwrap();
        assert_eq!(article.content.as_deref(), Some("Short summary"));
        assert_eq!(article.summary.as_deref(), Some("Short summary"));
    }

    #[test]
    fn test_no_summary_and_no_enrichment_leaves_content_absent() {
        let mut e = entry();
        e.summary = Some("   ".to_string());
        let article = normalizer()
            .normalize(&e, &EnrichmentOutcome::Skipped)
            .unwrap();
        assert_eq!(article.content, None);
        assert_eq!(article.summary, None);
    }

    #[test]
    fn test_empty_title_rejected() {
        let mut e = entry();
        e.title = " \u{7} ".to_string();
        let err = normalizer()
            .normalize(&e, &EnrichmentOutcome::Skipped)
            .unwrap_err();
        assert_eq!(err, ValidationError::empty("title"));
        assert_eq!(err.to_string(), "title is empty");
    }

    #[test]
    fn test_long_url_rejected_not_truncated() {
        let mut e = entry();
        e.link = format!("https://example.com/{}", "a".repeat(MAX_URL_CHARS));
        let err = normalizer()
            .normalize(&e, &EnrichmentOutcome::Skipped)
            .unwrap_err();
        assert_eq!(
            err.reason,
            ValidationReason::TooLong { max: MAX_URL_CHARS }
        );
    }

    #[test]
    fn test_title_truncated_to_exact_limit() {
        let mut e = entry();
        e.title = "x".repeat(600);
        let article = normalizer()
            .normalize(&e, &EnrichmentOutcome::Skipped)
            .unwrap();
        assert_eq!(article.title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_title_cut_on_whitespace_keeps_exact_limit() {
        let mut e = entry();
        e.title = format!("{} {}", "a".repeat(MAX_TITLE_CHARS - 1), "b".repeat(100));
        let article = normalizer()
            .normalize(&e, &EnrichmentOutcome::Skipped)
            .unwrap();
        assert_eq!(article.title.chars().count(), MAX_TITLE_CHARS);
        assert!(article.title.ends_with(' '));
    }

    #[test]
    fn test_empty_optionals_become_none() {
        let mut e = entry();
        e.author = Some(String::new());
        e.category = Some("\t".to_string());
        let article = normalizer()
            .normalize(&e, &EnrichmentOutcome::Skipped)
            .unwrap();
        assert_eq!(article.author, None);
        assert_eq!(article.category, None);
    }

    #[test]
    fn test_control_chars_stripped() {
        let mut e = entry();
        e.title = "Breaking\u{0}: news\u{1b}".to_string();
        let article = normalizer()
            .normalize(&e, &EnrichmentOutcome::Skipped)
            .unwrap();
        assert_eq!(article.title, "Breaking: news");
    }

    #[test]
    fn test_source_label_truncated() {
        let long_label = "S".repeat(300);
        let article = Normalizer::new(&long_label, scraped_at())
            .normalize(&entry(), &EnrichmentOutcome::Skipped)
            .unwrap();
        assert_eq!(article.source.chars().count(), MAX_SOURCE_CHARS);
    }

    proptest! {
        #[test]
        fn prop_fields_never_exceed_limits(
            title in "\\PC{1,700}",
            author in "\\PC{0,300}",
            category in "\\PC{0,200}",
        ) {
            let e = FeedEntry {
                link: "https://example.com/p".to_string(),
                title,
                summary: None,
                author: Some(author),
                category: Some(category),
                published: None,
            };

            if let Ok(article) = normalizer().normalize(&e, &EnrichmentOutcome::Skipped) {
                prop_assert!(article.title.chars().count() <= MAX_TITLE_CHARS);
                prop_assert!(!article.title.is_empty());
                prop_assert!(article.author.map_or(0, |a| a.chars().count()) <= MAX_AUTHOR_CHARS);
                prop_assert!(article.category.map_or(0, |c| c.chars().count()) <= MAX_CATEGORY_CHARS);
            }
        }

        #[test]
        fn prop_truncated_title_is_prefix(title in "[a-zA-Z][a-zA-Z ]{0,900}") {
            let e = FeedEntry {
                link: "https://example.com/p".to_string(),
                title: title.clone(),
                summary: None,
                author: None,
                category: None,
                published: None,
            };

            let article = normalizer().normalize(&e, &EnrichmentOutcome::Skipped).unwrap();
            prop_assert!(title.trim().starts_with(&article.title));
        }
    }
}
