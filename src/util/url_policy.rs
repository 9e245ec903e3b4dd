use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons an outbound URL is refused before any request is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlRejected {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Policy applied to every feed and article URL before it is requested.
///
/// Feed entries are untrusted input: an article link pointing at
/// `http://10.0.0.1/admin` would otherwise be fetched by the enricher.
/// The default policy only allows public http(s) hosts; deployments that
/// ingest from an intranet (and the test suite, which serves feeds from
/// `127.0.0.1`) opt in with `allow_private_hosts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    allow_private_hosts: bool,
}

impl UrlPolicy {
    pub fn new(allow_private_hosts: bool) -> Self {
        Self {
            allow_private_hosts,
        }
    }

    pub fn allows_private_hosts(&self) -> bool {
        self.allow_private_hosts
    }

    /// Parse `raw` and check it against the policy.
    ///
    /// # Errors
    ///
    /// - [`UrlRejected::InvalidUrl`] when `raw` does not parse
    /// - [`UrlRejected::UnsupportedScheme`] for anything but http/https
    /// - [`UrlRejected::Localhost`] / [`UrlRejected::PrivateIp`] for internal
    ///   hosts, unless private hosts are allowed
    pub fn check(&self, raw: &str) -> Result<Url, UrlRejected> {
        let url = Url::parse(raw.trim())?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlRejected::UnsupportedScheme(scheme.to_owned())),
        }

        if self.allow_private_hosts {
            return Ok(url);
        }

        if let Some(host) = url.host_str() {
            if host.eq_ignore_ascii_case("localhost") {
                return Err(UrlRejected::Localhost);
            }

            let bare = host
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(host);

            if let Ok(ip) = bare.parse::<IpAddr>() {
                if ip.is_loopback() {
                    return Err(UrlRejected::Localhost);
                }
                if is_internal(&ip) {
                    return Err(UrlRejected::PrivateIp(ip.to_string()));
                }
            }
        }

        Ok(url)
    }
}

fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        let policy = UrlPolicy::default();
        assert!(policy.check("https://feeds.bbci.co.uk/news/rss.xml").is_ok());
        assert!(policy.check("http://news.example.org:8080/rss").is_ok());
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let url = UrlPolicy::default()
            .check("  https://example.com/a  ")
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        let policy = UrlPolicy::default();
        assert!(matches!(
            policy.check("file:///etc/passwd"),
            Err(UrlRejected::UnsupportedScheme(s)) if s == "file"
        ));
        assert!(policy.check("ftp://example.com/feed").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            UrlPolicy::default().check("not a url"),
            Err(UrlRejected::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_internal_hosts_rejected_by_default() {
        let policy = UrlPolicy::default();
        assert_eq!(
            policy.check("http://localhost/feed"),
            Err(UrlRejected::Localhost)
        );
        assert_eq!(
            policy.check("http://127.0.0.1:9000/feed"),
            Err(UrlRejected::Localhost)
        );
        assert_eq!(policy.check("http://[::1]/feed"), Err(UrlRejected::Localhost));
        assert!(matches!(
            policy.check("http://192.168.1.1/feed"),
            Err(UrlRejected::PrivateIp(_))
        ));
        assert!(policy.check("http://10.0.0.1/feed").is_err());
        assert!(policy.check("http://169.254.1.1/feed").is_err());
        assert!(policy.check("http://[fe80::1]/feed").is_err());
        assert!(policy.check("http://0.0.0.0/feed").is_err());
    }

    #[test]
    fn test_private_hosts_allowed_when_opted_in() {
        let policy = UrlPolicy::new(true);
        assert!(policy.check("http://127.0.0.1:9000/feed").is_ok());
        assert!(policy.check("http://localhost/feed").is_ok());
        // Scheme check still applies
        assert!(policy.check("file:///etc/passwd").is_err());
    }
}
