//! RSS/Atom ingestion into a deduplicated article store.
//!
//! [`ingest::Scheduler`] runs cycles over the configured feeds: each feed is
//! fetched and parsed, each entry is optionally enriched with its page text,
//! normalized into an [`article::Article`], checked against the store by url
//! and then inserted, refreshed or skipped.

pub mod article;
pub mod config;
pub mod content;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
