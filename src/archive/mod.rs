//! Client for the external book archive.
//!
//! The archive offers no API for search: results are scraped from its HTML
//! search page. Downloads go through a JSON resolver that trades a content
//! hash and an account key for a short-lived direct URL.
//!
//! - [`meta`] - composite meta-line parsing (language, format, size)
//! - [`cover`] - ordered cover extraction rules
//! - [`search`] - search page traversal and single-hash lookup
//! - [`fetch`] - resolver call and streaming save

pub mod cover;
mod error;
pub mod fetch;
pub mod meta;
mod record;
pub mod search;
mod selectors;

use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

pub use error::{ArchiveError, NO_DOWNLOAD_URL};
pub use record::{Cover, FallbackCover, SearchResult};

/// Public archive mirror used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://annas-archive.org";

/// Connect timeout for all archive requests.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Total timeout for search pages and resolver calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Total timeout for one file transfer.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const SEARCH_PATH: &str = "search";
const RESOLVER_PATH: &str = "dyn/api/fast_download.json";

/// Default User-Agent for archive requests.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bookfetch/{version}")
}

/// Endpoint and timeout settings for [`ArchiveClient`].
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    /// Root of the archive site; search and resolver paths are joined onto it.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub user_agent: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            user_agent: default_user_agent(),
        }
    }
}

impl ArchiveSettings {
    /// Settings pointing at `base_url` with default timeouts.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// HTTP client for archive search and downloads.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    http: Client,
    base_url: Url,
    download_timeout: Duration,
}

impl ArchiveClient {
    /// Builds a client from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidUrl`] if the base URL does not parse,
    /// or [`ArchiveError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(settings: &ArchiveSettings) -> Result<Self, ArchiveError> {
        let mut base_url = Url::parse(settings.base_url.trim())
            .map_err(|_| ArchiveError::invalid_url(&settings.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(ArchiveError::invalid_url(&settings.base_url));
        }
        // Joins replace the last path segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.as_str())
            .gzip(true)
            .build()
            .map_err(ArchiveError::ClientBuild)?;

        debug!(base_url = %base_url, "archive client ready");
        Ok(Self {
            http,
            base_url,
            download_timeout: settings.download_timeout,
        })
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn search_url(&self, query: &str) -> Result<Url, ArchiveError> {
        let relative = format!("{SEARCH_PATH}?q={}", urlencoding::encode(query));
        self.base_url
            .join(&relative)
            .map_err(|_| ArchiveError::invalid_url(relative))
    }

    fn resolver_url(&self, hash: &str, secret_key: &str) -> Result<Url, ArchiveError> {
        let relative = format!(
            "{RESOLVER_PATH}?md5={}&key={}",
            urlencoding::encode(hash),
            urlencoding::encode(secret_key)
        );
        self.base_url
            .join(&relative)
            .map_err(|_| ArchiveError::invalid_url(self.resolver_display_url(hash)))
    }

    /// Resolver URL with the key left out, safe for logs and error messages.
    fn resolver_display_url(&self, hash: &str) -> String {
        format!(
            "{}{RESOLVER_PATH}?md5={}",
            self.base_url,
            urlencoding::encode(hash)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> ArchiveClient {
        ArchiveClient::new(&ArchiveSettings::with_base_url(base)).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_search_url_escapes_query() {
        let url = client("https://archive.example").search_url("programming golang & more");
        assert_eq!(
            url.map(String::from).ok().as_deref(),
            Some("https://archive.example/search?q=programming%20golang%20%26%20more")
        );
    }

    #[test]
    fn test_base_url_with_path_keeps_prefix() {
        let url = client("https://mirror.example/archive").search_url("x");
        assert_eq!(
            url.map(String::from).ok().as_deref(),
            Some("https://mirror.example/archive/search?q=x")
        );
    }

    #[test]
    fn test_resolver_url_carries_hash_and_key() {
        let url = client("https://archive.example").resolver_url("abc", "k/1");
        assert_eq!(
            url.map(String::from).ok().as_deref(),
            Some("https://archive.example/dyn/api/fast_download.json?md5=abc&key=k%2F1")
        );
    }

    #[test]
    fn test_resolver_display_url_omits_key() {
        let shown = client("https://archive.example").resolver_display_url("abc");
        assert_eq!(shown, "https://archive.example/dyn/api/fast_download.json?md5=abc");
        assert!(!shown.contains("key="));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = ArchiveClient::new(&ArchiveSettings::with_base_url("not a url")).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidUrl { .. }));
    }

    #[test]
    fn test_default_user_agent_has_version() {
        assert_eq!(
            default_user_agent(),
            format!("bookfetch/{}", env!("CARGO_PKG_VERSION"))
        );
    }
}
