//! Where book bytes and metadata come from.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::archive::{ArchiveClient, ArchiveError};
use crate::store::BookMetadata;

/// Metadata lookup and download for a content hash.
///
/// Implemented by [`ArchiveSource`]; tests substitute their own.
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Looks up descriptive metadata for `hash`.
    async fn fetch_metadata(&self, hash: &str) -> Result<BookMetadata, ArchiveError>;

    /// Saves the book into `dest_dir` as `metadata.filename(hash)` and
    /// returns the written path.
    async fn download(
        &self,
        hash: &str,
        metadata: &BookMetadata,
        dest_dir: &Path,
    ) -> Result<PathBuf, ArchiveError>;
}

/// [`BookSource`] backed by the archive, holding the account key.
#[derive(Clone)]
pub struct ArchiveSource {
    client: ArchiveClient,
    secret_key: String,
}

impl ArchiveSource {
    #[must_use]
    pub fn new(client: ArchiveClient, secret_key: impl Into<String>) -> Self {
        Self {
            client,
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("base_url", &self.client.base_url().as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BookSource for ArchiveSource {
    async fn fetch_metadata(&self, hash: &str) -> Result<BookMetadata, ArchiveError> {
        let result = self.client.book_metadata(hash).await?;
        Ok(BookMetadata::from(&result))
    }

    async fn download(
        &self,
        hash: &str,
        metadata: &BookMetadata,
        dest_dir: &Path,
    ) -> Result<PathBuf, ArchiveError> {
        self.client
            .download(hash, metadata, &self.secret_key, dest_dir)
            .await
    }
}
