use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::schema::Database;
use super::types::{
    to_millis, ArticleQuery, ArticleRow, ArticleStats, DatabaseError, InsertOutcome,
    StoredArticle, UpdateOutcome,
};
use crate::article::Article;

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of articles returned by one listing query (OOM protection)
const MAX_LIST_LIMIT: i64 = 500;

/// Page size when the caller does not ask for one
const DEFAULT_LIST_LIMIT: i64 = 50;

const ARTICLE_COLUMNS: &str = "id, url, title, content, summary, author, source, category, published_at, scraped_at";

impl Database {
    // ========================================================================
    // Pipeline Operations
    // ========================================================================

    /// Look up an article by its exact url.
    pub async fn find_by_url(&self, url: &str) -> Result<Option<StoredArticle>, DatabaseError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(ArticleRow::into_stored))
    }

    /// Insert a new article.
    ///
    /// A url that already exists is reported as
    /// [`InsertOutcome::ConstraintViolation`] rather than an error, since
    /// another cycle may have inserted it between lookup and write.
    pub async fn insert_article(&self, article: &Article) -> Result<InsertOutcome, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
                (url, title, content, summary, author, source, category, published_at, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.summary)
        .bind(&article.author)
        .bind(&article.source)
        .bind(&article.category)
        .bind(article.published_at.map(to_millis))
        .bind(to_millis(article.scraped_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(InsertOutcome::Inserted(done.last_insert_rowid())),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::ConstraintViolation)
            }
            Err(e) => Err(DatabaseError::from_sqlx(e)),
        }
    }

    /// Refresh every field of the article stored under `url`, bumping
    /// `scraped_at`. The url itself never changes.
    pub async fn update_by_url(
        &self,
        url: &str,
        article: &Article,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE articles SET
                title = ?,
                content = ?,
                summary = ?,
                author = ?,
                source = ?,
                category = ?,
                published_at = ?,
                scraped_at = ?
            WHERE url = ?
        "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.summary)
        .bind(&article.author)
        .bind(&article.source)
        .bind(&article.category)
        .bind(article.published_at.map(to_millis))
        .bind(to_millis(article.scraped_at))
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() > 0 {
            Ok(UpdateOutcome::Updated)
        } else {
            Ok(UpdateOutcome::NotFound)
        }
    }

    // ========================================================================
    // Read-side Queries
    // ========================================================================

    /// List articles matching `query`, newest publication first.
    ///
    /// Articles without a publication date sort after dated ones, then by
    /// scrape time. The limit is capped at 500.
    pub async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<StoredArticle>> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let offset = query.offset.unwrap_or(0).max(0);

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));
        push_filters(&mut builder, query);
        builder.push(" ORDER BY published_at DESC NULLS LAST, scraped_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let rows = builder
            .build_query_as::<ArticleRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(ArticleRow::into_stored).collect())
    }

    /// Count articles matching `query` (limit and offset are ignored).
    pub async fn count_articles(&self, query: &ArticleQuery) -> Result<i64> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM articles");
        push_filters(&mut builder, query);

        let (count,) = builder
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Every distinct source label, alphabetically.
    pub async fn distinct_sources(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT source FROM articles ORDER BY source")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// Every distinct non-null category, alphabetically.
    pub async fn distinct_categories(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT category FROM articles WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Totals, per-source counts and the number of articles scraped in the
    /// 24 hours before `now`.
    pub async fn stats(&self, now: DateTime<Utc>) -> Result<ArticleStats> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;

        let by_source: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT source, COUNT(*) AS n
            FROM articles
            GROUP BY source
            ORDER BY n DESC, source
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let since = to_millis(now - Duration::hours(24));
        let (recent_24h,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM articles WHERE scraped_at >= ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        Ok(ArticleStats {
            total,
            by_source,
            recent_24h,
        })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &ArticleQuery) {
    let mut has_where = false;

    for (column, value) in [
        ("source", &query.source),
        ("category", &query.category),
        ("author", &query.author),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            push_clause(builder, &mut has_where);
            builder.push(format!("{column} LIKE "));
            builder.push_bind(like_pattern(value));
            builder.push(" ESCAPE '\\'");
        }
    }

    if let Some(search) = query.search.as_deref().filter(|v| !v.is_empty()) {
        let pattern = like_pattern(search);
        push_clause(builder, &mut has_where);
        builder.push("(title LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR summary LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" ESCAPE '\\' OR content LIKE ");
        builder.push_bind(pattern);
        builder.push(" ESCAPE '\\')");
    }

    if let Some(from) = query.from {
        push_clause(builder, &mut has_where);
        builder.push("published_at >= ");
        builder.push_bind(to_millis(from));
    }

    if let Some(to) = query.to {
        push_clause(builder, &mut has_where);
        builder.push("published_at <= ");
        builder.push_bind(to_millis(to));
    }
}

/// Substring pattern with `%`, `_` and the escape char itself matched literally.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_clause(builder: &mut QueryBuilder<'_, Sqlite>, has_where: &mut bool) {
    builder.push(if *has_where { " AND " } else { " WHERE " });
    *has_where = true;
}
