//! Error types for the archive search and fetch clients.

use std::path::PathBuf;

use thiserror::Error;

/// Generic message when the resolver returns neither a URL nor an error.
pub const NO_DOWNLOAD_URL: &str = "failed to get download URL";

/// Errors that can occur while talking to the book archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The HTTP client could not be constructed.
    #[error("failed to build archive HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// A URL could not be built or resolved.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
    },

    /// Network-level error (DNS, connection refused, TLS, ...).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL being requested.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success response from the search page.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Resolver body was not the expected JSON.
    #[error("malformed resolver response from {url}: {reason}")]
    MalformedResponse {
        /// Resolver URL (secret key redacted).
        url: String,
        /// Decode failure description.
        reason: String,
    },

    /// Resolver declined to produce a download URL; carries its message verbatim.
    #[error("{0}")]
    Resolver(String),

    /// Direct download answered with something other than 200.
    #[error("failed to download file: HTTP {status}")]
    DownloadFailed {
        /// The HTTP status code.
        status: u16,
    },

    /// Body stream broke off mid-transfer.
    #[error("download of {url} interrupted: {source}")]
    Stream {
        /// The download URL.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// File system error while saving.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Search found no result carrying the requested hash.
    #[error("book with hash {hash} not found")]
    NotFound {
        /// The requested hash.
        hash: String,
    },
}

impl ArchiveError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds the resolver refusal error, falling back to a generic message.
    pub fn resolver(message: Option<&str>) -> Self {
        let message = message.map(str::trim).filter(|m| !m.is_empty());
        Self::Resolver(message.unwrap_or(NO_DOWNLOAD_URL).to_string())
    }

    /// True when the destination file was opened before the failure, so a
    /// partial file may be left behind.
    #[must_use]
    pub fn leaves_partial_file(&self) -> bool {
        matches!(self, Self::Stream { .. } | Self::Io { .. })
    }
}
