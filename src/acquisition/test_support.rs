//! In-process fakes for acquisition tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::BookSource;
use crate::archive::ArchiveError;
use crate::store::{
    BookMetadata, BookRepository, BookStatus, BookStore, CreateOutcome, DownloadJob,
    JobRepository, JobStatus, NewBook, Result, SavedBook, StoreDbErrorKind, StoreError,
};

/// How [`FakeSource::download`] behaves.
#[derive(Debug, Clone)]
pub(crate) enum DownloadBehavior {
    /// Write `bytes` and succeed.
    Write(Vec<u8>),
    /// Resolver refuses with this message.
    Refuse(String),
    /// Write some bytes, then fail as a broken disk would.
    WriteThenFail,
    /// Take this long over the transfer, then succeed.
    SlowWrite(Duration),
}

/// Scriptable [`BookSource`] that counts calls.
#[derive(Debug)]
pub(crate) struct FakeSource {
    pub metadata: Option<BookMetadata>,
    pub behavior: DownloadBehavior,
    pub metadata_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(metadata: Option<BookMetadata>, behavior: DownloadBehavior) -> Self {
        Self {
            metadata,
            behavior,
            metadata_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(title: &str) -> Self {
        Self::new(
            Some(BookMetadata {
                title: title.to_string(),
                format: Some("epub".to_string()),
                ..BookMetadata::default()
            }),
            DownloadBehavior::Write(b"book bytes".to_vec()),
        )
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookSource for FakeSource {
    async fn fetch_metadata(&self, hash: &str) -> std::result::Result<BookMetadata, ArchiveError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.metadata.clone().ok_or_else(|| ArchiveError::NotFound {
            hash: hash.to_string(),
        })
    }

    async fn download(
        &self,
        hash: &str,
        metadata: &BookMetadata,
        dest_dir: &Path,
    ) -> std::result::Result<PathBuf, ArchiveError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let path = dest_dir.join(metadata.filename(hash));
        match &self.behavior {
            DownloadBehavior::Write(bytes) => {
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| ArchiveError::io(&path, e))?;
                Ok(path)
            }
            DownloadBehavior::Refuse(message) => Err(ArchiveError::resolver(Some(message.as_str()))),
            DownloadBehavior::WriteThenFail => {
                tokio::fs::write(&path, b"partial")
                    .await
                    .map_err(|e| ArchiveError::io(&path, e))?;
                Err(ArchiveError::io(&path, std::io::Error::other("disk full")))
            }
            DownloadBehavior::SlowWrite(delay) => {
                tokio::time::sleep(*delay).await;
                tokio::fs::write(&path, b"slow book bytes")
                    .await
                    .map_err(|e| ArchiveError::io(&path, e))?;
                Ok(path)
            }
        }
    }
}

/// [`JobRepository`] whose writes always fail with a busy database.
#[derive(Debug, Default)]
pub(crate) struct FailingJobs;

fn busy() -> StoreError {
    StoreError::Database {
        kind: StoreDbErrorKind::BusyOrLocked,
        message: "database is locked".to_string(),
    }
}

#[async_trait]
impl JobRepository for FailingJobs {
    async fn claim_pending(&self, _limit: usize) -> Result<Vec<DownloadJob>> {
        Err(busy())
    }

    async fn update_status(
        &self,
        _id: i64,
        _status: JobStatus,
        _progress: u8,
        _error_msg: Option<&str>,
    ) -> Result<()> {
        Err(busy())
    }

    async fn update_file_path(&self, _id: i64, _file_path: &Path) -> Result<()> {
        Err(busy())
    }

    async fn reset_stale(&self, _cutoff: i64, _owned: &[i64]) -> Result<u64> {
        Err(busy())
    }

    async fn reset_in_flight(&self) -> Result<u64> {
        Err(busy())
    }
}

/// [`BookRepository`] over a real store with scripted failures.
#[derive(Debug)]
pub(crate) struct FlakyBooks {
    inner: BookStore,
    lookup_error: Option<StoreDbErrorKind>,
    conflicting_creates: bool,
}

impl FlakyBooks {
    /// Every `get_by_hash` fails with `kind`.
    pub fn failing_lookups(inner: BookStore, kind: StoreDbErrorKind) -> Self {
        Self {
            inner,
            lookup_error: Some(kind),
            conflicting_creates: false,
        }
    }

    /// `create` inserts the row, then reports a unique constraint failure as
    /// if another job had won the insert.
    pub fn conflicting_creates(inner: BookStore) -> Self {
        Self {
            inner,
            lookup_error: None,
            conflicting_creates: true,
        }
    }
}

#[async_trait]
impl BookRepository for FlakyBooks {
    async fn get_by_hash(&self, hash: &str) -> Result<Option<SavedBook>> {
        if let Some(kind) = self.lookup_error {
            return Err(StoreError::Database {
                kind,
                message: "lookup failed".to_string(),
            });
        }
        BookRepository::get_by_hash(&self.inner, hash).await
    }

    async fn create(&self, book: &NewBook<'_>) -> Result<CreateOutcome> {
        let outcome = BookRepository::create(&self.inner, book).await?;
        if self.conflicting_creates {
            return Err(StoreError::Database {
                kind: StoreDbErrorKind::ConstraintViolation,
                message: "UNIQUE constraint failed: books.hash".to_string(),
            });
        }
        Ok(outcome)
    }

    async fn update_status(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
    ) -> Result<()> {
        BookRepository::update_status(&self.inner, hash, status, file_path).await
    }

    async fn update_with_metadata(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
        metadata: &BookMetadata,
    ) -> Result<()> {
        BookRepository::update_with_metadata(&self.inner, hash, status, file_path, metadata)
            .await
    }

    async fn delete_older_than(&self, cutoff: i64, status: BookStatus) -> Result<u64> {
        BookRepository::delete_older_than(&self.inner, cutoff, status).await
    }
}
