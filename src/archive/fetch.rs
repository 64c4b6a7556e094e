//! Resolver call and streaming save.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use super::{ArchiveClient, ArchiveError};
use crate::store::BookMetadata;

/// Body of the fast-download resolver.
#[derive(Debug, Default, Deserialize)]
struct ResolverResponse {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ArchiveClient {
    /// Downloads the book `hash` into `dest_dir`.
    ///
    /// The file is named by [`BookMetadata::filename`], so the returned path is
    /// exactly what callers should persist. A partially written file is left
    /// in place on failure.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Resolver`] when the resolver returns no URL (its own
    ///   message, or "failed to get download URL")
    /// - [`ArchiveError::MalformedResponse`] when the resolver body is not JSON
    /// - [`ArchiveError::DownloadFailed`] on a non-200 download response
    /// - [`ArchiveError::Stream`]/[`ArchiveError::Io`] while writing
    #[instrument(skip(self, metadata, secret_key, dest_dir), fields(dest = %dest_dir.display()))]
    pub async fn download(
        &self,
        hash: &str,
        metadata: &BookMetadata,
        secret_key: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, ArchiveError> {
        let download_url = self.resolve_download_url(hash, secret_key).await?;

        let response = self
            .http
            .get(&download_url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| ArchiveError::network(&download_url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ArchiveError::DownloadFailed {
                status: status.as_u16(),
            });
        }

        let file_path = dest_dir.join(metadata.filename(hash));
        let mut file = File::create(&file_path)
            .await
            .map_err(|e| ArchiveError::io(&file_path, e))?;
        let bytes = stream_to_file(&mut file, response, &download_url, &file_path).await?;

        info!(path = %file_path.display(), bytes, "book saved");
        Ok(file_path)
    }

    /// Trades `hash` and `secret_key` for a direct download URL.
    async fn resolve_download_url(&self, hash: &str, secret_key: &str) -> Result<String, ArchiveError> {
        let url = self.resolver_url(hash, secret_key)?;
        let shown = self.resolver_display_url(hash);

        // without_url keeps the key out of error text
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ArchiveError::network(&shown, e.without_url()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ArchiveError::network(&shown, e.without_url()))?;

        let decoded: ResolverResponse =
            serde_json::from_slice(&body).map_err(|e| ArchiveError::MalformedResponse {
                url: shown.clone(),
                reason: e.to_string(),
            })?;

        match decoded.download_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                debug!(resolver = %shown, "download URL resolved");
                Ok(url.to_string())
            }
            _ => Err(ArchiveError::resolver(decoded.error.as_deref())),
        }
    }
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, ArchiveError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|source| ArchiveError::Stream {
            url: url.to_string(),
            source,
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ArchiveError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| ArchiveError::io(file_path, e))?;

    Ok(bytes_written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_response_tolerates_missing_fields() {
        let decoded: ResolverResponse = serde_json::from_str("{}").unwrap();
        assert!(decoded.download_url.is_none());
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_resolver_response_accepts_null_url() {
        let decoded: ResolverResponse =
            serde_json::from_str(r#"{"download_url": null, "error": "Invalid md5"}"#).unwrap();
        assert!(decoded.download_url.is_none());
        assert_eq!(decoded.error.as_deref(), Some("Invalid md5"));
    }
}
