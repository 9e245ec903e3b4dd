use crate::util::{UrlPolicy, UrlRejected};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
///
/// Every variant is source-level: the scheduler marks the source failed for
/// this cycle and moves on to the others.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request (including the body read) exceeded the fetch timeout
    #[error("Request timed out")]
    Timeout,
    /// No TCP/TLS connection could be established (refused, DNS failure, unreachable)
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Redirect chain exceeded the configured limit
    #[error("Too many redirects")]
    TooManyRedirects,
    /// Any other transport-level failure
    #[error("Request failed: {0}")]
    Network(reqwest::Error),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Feed URL refused by the outbound URL policy
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlRejected),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_redirect() {
            FetchError::TooManyRedirects
        } else if err.is_connect() {
            FetchError::ConnectionRefused(err.to_string())
        } else {
            FetchError::Network(err)
        }
    }

    /// Whether a later attempt at the same URL could plausibly succeed.
    ///
    /// 4xx responses (except 429), redirect loops, oversize bodies and policy
    /// rejections are permanent for the purposes of one cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout
            | FetchError::ConnectionRefused(_)
            | FetchError::Network(_)
            | FetchError::IncompleteResponse { .. } => true,
            FetchError::HttpStatus(status) => *status == 429 || *status >= 500,
            FetchError::TooManyRedirects
            | FetchError::ResponseTooLarge
            | FetchError::InvalidUrl(_) => false,
        }
    }
}

/// A successfully retrieved feed document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Builds the HTTP client shared by the fetcher and the enricher.
///
/// The redirect limit is enforced here so an exhausted chain surfaces as
/// [`FetchError::TooManyRedirects`] rather than a generic network error.
pub fn build_client(user_agent: &str, max_redirects: usize) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(max_redirects))
        .build()
}

/// Retrieves raw feed documents with a bounded per-request timeout.
///
/// The fetcher never retries; retry policy belongs to the scheduler, which
/// knows how much of the cycle deadline is left.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    policy: UrlPolicy,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, timeout: Duration, policy: UrlPolicy) -> Self {
        Self {
            client,
            timeout,
            policy,
        }
    }

    /// Fetch one feed document.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - URL refused before any request is made
    /// - [`FetchError::Timeout`] - request plus body read exceeded the timeout
    /// - [`FetchError::ConnectionRefused`] - no connection could be made
    /// - [`FetchError::TooManyRedirects`] - redirect limit exhausted
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] - body problems
    pub async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let target = self.policy.check(url)?;

        tokio::time::timeout(self.timeout, self.fetch_unbounded(target))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn fetch_unbounded(&self, url: Url) -> Result<FetchedDocument, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = read_limited_bytes(response, MAX_FEED_SIZE).await?;
        Ok(FetchedDocument {
            status: status.as_u16(),
            body,
        })
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
