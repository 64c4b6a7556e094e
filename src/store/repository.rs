//! Repository seams for book and job persistence.
//!
//! The acquisition processor and scheduler depend on these traits rather than
//! on the `SQLite` stores directly, so tests can substitute failing stores.

use std::path::Path;

use async_trait::async_trait;

use super::{
    BookMetadata, BookStatus, BookStore, CreateOutcome, DownloadJob, JobStatus, JobStore, NewBook,
    Result, SavedBook,
};

/// Data-access contract for book rows.
///
/// Implementations must enforce `hash` uniqueness and make `create` an
/// insert-if-absent.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Looks up the row for a hash.
    async fn get_by_hash(&self, hash: &str) -> Result<Option<SavedBook>>;

    /// Inserts a row unless one exists for the hash.
    async fn create(&self, book: &NewBook<'_>) -> Result<CreateOutcome>;

    /// Sets status and (for ready books) file path.
    async fn update_status(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
    ) -> Result<()>;

    /// Sets status, file path, and metadata.
    async fn update_with_metadata(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
        metadata: &BookMetadata,
    ) -> Result<()>;

    /// Deletes rows in `status` created before `cutoff`.
    async fn delete_older_than(&self, cutoff: i64, status: BookStatus) -> Result<u64>;
}

/// Data-access contract for download jobs.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Claims up to `limit` pending jobs, oldest first.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<DownloadJob>>;

    /// Sets status, progress, and error message.
    async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        progress: u8,
        error_msg: Option<&str>,
    ) -> Result<()>;

    /// Attaches the downloaded file path.
    async fn update_file_path(&self, id: i64, file_path: &Path) -> Result<()>;

    /// Returns stalled `downloading` jobs to `pending`, skipping `owned` ids.
    async fn reset_stale(&self, cutoff: i64, owned: &[i64]) -> Result<u64>;

    /// Returns every `downloading` job to `pending`.
    async fn reset_in_flight(&self) -> Result<u64>;
}

#[async_trait]
impl BookRepository for BookStore {
    async fn get_by_hash(&self, hash: &str) -> Result<Option<SavedBook>> {
        BookStore::get_by_hash(self, hash).await
    }

    async fn create(&self, book: &NewBook<'_>) -> Result<CreateOutcome> {
        BookStore::create(self, book).await
    }

    async fn update_status(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
    ) -> Result<()> {
        BookStore::update_status(self, hash, status, file_path).await
    }

    async fn update_with_metadata(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
        metadata: &BookMetadata,
    ) -> Result<()> {
        BookStore::update_with_metadata(self, hash, status, file_path, metadata).await
    }

    async fn delete_older_than(&self, cutoff: i64, status: BookStatus) -> Result<u64> {
        BookStore::delete_older_than(self, cutoff, status).await
    }
}

#[async_trait]
impl JobRepository for JobStore {
    async fn claim_pending(&self, limit: usize) -> Result<Vec<DownloadJob>> {
        JobStore::claim_pending(self, limit).await
    }

    async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        progress: u8,
        error_msg: Option<&str>,
    ) -> Result<()> {
        JobStore::update_status(self, id, status, progress, error_msg).await
    }

    async fn update_file_path(&self, id: i64, file_path: &Path) -> Result<()> {
        JobStore::update_file_path(self, id, file_path).await
    }

    async fn reset_stale(&self, cutoff: i64, owned: &[i64]) -> Result<u64> {
        JobStore::reset_stale(self, cutoff, owned).await
    }

    async fn reset_in_flight(&self) -> Result<u64> {
        JobStore::reset_in_flight(self).await
    }
}
