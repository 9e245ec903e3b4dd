use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use newswire::config::Config;
use newswire::content::Enricher;
use newswire::feed::{build_client, Fetcher};
use newswire::ingest::{CycleSummary, Scheduler, SourceStatus};
use newswire::storage::{ArticleQuery, Database, DatabaseError};
use newswire::util::UrlPolicy;

#[derive(Parser, Debug)]
#[command(name = "newswire", version, about = "RSS ingestion into a deduplicated article store")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "newswire.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a cycle now and then every scrape interval until Ctrl-C
    Run,
    /// Run exactly one cycle and print its summary
    Once {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored articles, newest first
    List {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Substring match on title, summary or content
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show store totals
    Stats,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(DatabaseError::Locked) => {
            eprintln!(
                "Error: database '{}' is locked by another process. Close it and try again.",
                config.database_path
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let result = match args.command {
        Command::Run => {
            let scheduler = build_scheduler(&config, &db)?;
            scheduler
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                })
                .await;
            Ok(())
        }
        Command::Once { json } => {
            let scheduler = build_scheduler(&config, &db)?;
            let summary = scheduler.run_one_cycle().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
        Command::List {
            source,
            category,
            search,
            limit,
        } => list(&db, source, category, search, limit).await,
        Command::Stats => stats(&db).await,
    };

    db.close().await;
    result
}

fn build_scheduler(config: &Config, db: &Database) -> Result<Scheduler> {
    let client = build_client(&config.user_agent, config.max_redirects)
        .context("Failed to build HTTP client")?;
    let policy = UrlPolicy::new(config.allow_private_hosts);

    let fetcher = Fetcher::new(client.clone(), config.fetch_timeout(), policy);
    let enricher = if config.enrich {
        Enricher::new(client, config.enrich_timeout(), policy)
    } else {
        Enricher::disabled(client)
    };

    Ok(Scheduler::new(
        db,
        config.feed_sources(),
        config.ingest_settings(),
        fetcher,
        enricher,
    ))
}

fn print_summary(summary: &CycleSummary) {
    println!(
        "Cycle {} ({} ms)",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        (summary.finished_at - summary.started_at).num_milliseconds()
    );
    for source in &summary.sources {
        let status = match &source.status {
            SourceStatus::Done => "done".to_string(),
            SourceStatus::Failed(failure) => format!("failed: {failure}"),
        };
        println!(
            "  {:<24} inserted {:>3}  updated {:>3}  skipped {:>3}  failed {:>3}  degraded {:>3}  [{}]",
            source.label,
            source.counts.inserted,
            source.counts.updated,
            source.counts.skipped,
            source.counts.failed,
            source.degraded,
            status
        );
    }
    println!(
        "Total: inserted {}, updated {}, skipped {}, failed {}",
        summary.totals.inserted, summary.totals.updated, summary.totals.skipped, summary.totals.failed
    );
}

async fn list(
    db: &Database,
    source: Option<String>,
    category: Option<String>,
    search: Option<String>,
    limit: i64,
) -> Result<()> {
    let query = ArticleQuery {
        source,
        category,
        search,
        limit: Some(limit),
        ..Default::default()
    };

    let articles = db.list_articles(&query).await.context("Failed to list articles")?;
    let total = db.count_articles(&query).await.context("Failed to count articles")?;

    for article in &articles {
        let date = article
            .published_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{date:<16}  {:<20}  {}", article.source, article.title);
        println!("{:<16}  {}", "", article.url);
    }
    println!("Showing {} of {} articles", articles.len(), total);
    Ok(())
}

async fn stats(db: &Database) -> Result<()> {
    let stats = db.stats(Utc::now()).await.context("Failed to load stats")?;
    let categories = db
        .distinct_categories()
        .await
        .context("Failed to load categories")?;

    println!("Articles: {}", stats.total);
    println!("Scraped in last 24h: {}", stats.recent_24h);
    println!("By source:");
    for (source, count) in &stats.by_source {
        println!("  {source:<24} {count}");
    }
    if !categories.is_empty() {
        println!("Categories: {}", categories.join(", "));
    }
    Ok(())
}
