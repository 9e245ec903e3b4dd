//! Utility functions shared by the fetch, enrichment and normalization stages.
//!
//! - **URL policy**: scheme and host checks applied before any outbound request
//! - **Text processing**: HTML-to-text, whitespace collapsing, char-exact truncation

mod text;
mod url_policy;

pub use text::{collapse_whitespace, html_to_text, strip_control_chars, truncate_chars};
pub use url_policy::{UrlPolicy, UrlRejected};
