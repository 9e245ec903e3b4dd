//! Feed retrieval and parsing.
//!
//! - [`fetcher`] - HTTP retrieval of raw feed documents with a bounded timeout
//! - [`parser`] - tolerant RSS/Atom parsing into candidate entries via `feed-rs`
//!
//! ```ignore
//! use newswire::feed::{parse_feed, Fetcher};
//!
//! let doc = fetcher.fetch("https://feeds.bbci.co.uk/news/rss.xml").await?;
//! for entry in parse_feed(&doc.body)?.entries() {
//!     println!("{} -> {}", entry.title, entry.link);
//! }
//! ```

mod fetcher;
mod parser;

pub use fetcher::{build_client, FetchError, FetchedDocument, Fetcher};
pub use parser::{parse_feed, FeedEntry, ParseError, ParsedFeed};
