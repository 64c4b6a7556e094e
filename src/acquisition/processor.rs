//! Per-job state machine.
//!
//! A claimed job moves `downloading → completed | failed`. The book row for
//! its hash is shared with every other job for that hash: a ready row whose
//! file is on disk completes the job without touching the network, anything
//! else is (re)acquired against the same row.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{AcquisitionError, BookSource};
use crate::store::{
    BookMetadata, BookRepository, BookStatus, CreateOutcome, DownloadJob, JobRepository,
    JobStatus, NewBook, SavedBook, StoreError,
};

/// Progress when processing starts.
const PROGRESS_STARTED: u8 = 10;
/// Progress once the book row is in place.
const PROGRESS_REGISTERED: u8 = 30;
/// Progress right before the transfer starts.
const PROGRESS_FETCHING: u8 = 50;
/// Progress after the file is on disk.
const PROGRESS_SAVED: u8 = 90;
const PROGRESS_DONE: u8 = 100;
const PROGRESS_FAILED: u8 = 0;

/// How processing of one job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job is `completed` and points at `file_path`.
    Completed {
        file_path: PathBuf,
        /// True when an existing ready file was reused without downloading.
        reused: bool,
    },
    /// Job is `failed` with `message`.
    Failed { message: String },
    /// A status write failed; the job was left as it was.
    Abandoned,
}

struct Acquired {
    file_path: PathBuf,
    reused: bool,
}

/// Drives claimed jobs to a terminal state.
#[derive(Clone)]
pub struct JobProcessor {
    books: Arc<dyn BookRepository>,
    jobs: Arc<dyn JobRepository>,
    source: Arc<dyn BookSource>,
    download_dir: PathBuf,
}

impl std::fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}

impl JobProcessor {
    #[must_use]
    pub fn new(
        books: Arc<dyn BookRepository>,
        jobs: Arc<dyn JobRepository>,
        source: Arc<dyn BookSource>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            books,
            jobs,
            source,
            download_dir: download_dir.into(),
        }
    }

    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Runs one job to completion.
    ///
    /// Never returns an error: failures are recorded on the job (and the book
    /// row, when acquisition itself failed) and reported through
    /// [`JobOutcome`]. A busy database leaves the job `downloading` for the
    /// scheduler's stale sweep.
    #[instrument(skip(self, job), fields(job_id = job.id, hash = %job.book_hash))]
    pub async fn process(&self, job: &DownloadJob) -> JobOutcome {
        if let Err(e) = self
            .jobs
            .update_status(job.id, JobStatus::Downloading, PROGRESS_STARTED, None)
            .await
        {
            warn!(error = %e, "could not mark job downloading; abandoning");
            return JobOutcome::Abandoned;
        }

        let existing = match self.books.get_by_hash(&job.book_hash).await {
            Ok(existing) => existing,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "book lookup failed transiently; leaving job to the stale sweep");
                return JobOutcome::Abandoned;
            }
            Err(e) => return self.fail_job(job, &AcquisitionError::Store(e)).await,
        };

        if let Some(book) = &existing
            && book.status() == BookStatus::Ready
        {
            if let Some(path) = ready_file(book).await {
                debug!(path = %path.display(), "book already on disk");
                return self
                    .complete(job, Acquired { file_path: path, reused: true })
                    .await;
            }
            info!("ready book is missing its file; downloading again");
        }

        match self.acquire(job, existing).await {
            Ok(acquired) => self.complete(job, acquired).await,
            Err(e) => self.fail(job, &e).await,
        }
    }

    async fn acquire(
        &self,
        job: &DownloadJob,
        existing: Option<SavedBook>,
    ) -> Result<Acquired, AcquisitionError> {
        let hash = job.book_hash.as_str();
        let metadata = match existing {
            Some(book) => book.metadata(),
            None => match self.register(job).await? {
                Registered::Fresh(metadata) => metadata,
                Registered::Existing(book) => {
                    if book.status() == BookStatus::Ready
                        && let Some(path) = ready_file(&book).await
                    {
                        return Ok(Acquired {
                            file_path: path,
                            reused: true,
                        });
                    }
                    book.metadata()
                }
            },
        };

        self.checkpoint(job, PROGRESS_REGISTERED).await;
        self.checkpoint(job, PROGRESS_FETCHING).await;

        let file_path = match self.source.download(hash, &metadata, &self.download_dir).await {
            Ok(path) => path,
            Err(e) => {
                if e.leaves_partial_file() {
                    remove_partial(&self.download_dir.join(metadata.filename(hash))).await;
                }
                return Err(e.into());
            }
        };

        self.checkpoint(job, PROGRESS_SAVED).await;
        self.books
            .update_with_metadata(hash, BookStatus::Ready, Some(&file_path), &metadata)
            .await?;

        Ok(Acquired {
            file_path,
            reused: false,
        })
    }

    /// Creates the book row for a never-seen hash.
    ///
    /// Metadata lookup failure falls back to a placeholder so the download is
    /// still attempted. Losing an insert race is not an error, whether the
    /// store reports it as an existing row or as a constraint violation: the
    /// row written by the other job is used instead.
    async fn register(&self, job: &DownloadJob) -> Result<Registered, AcquisitionError> {
        let hash = job.book_hash.as_str();
        let metadata = match self.source.fetch_metadata(hash).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "metadata lookup failed; using placeholder");
                BookMetadata::placeholder()
            }
        };

        let outcome = match self
            .books
            .create(&NewBook {
                hash,
                metadata: &metadata,
                status: BookStatus::Processing,
                requested_by: Some(job.user_id),
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) if e.is_constraint_violation() => CreateOutcome::AlreadyExists,
            Err(e) => return Err(e.into()),
        };

        match outcome {
            CreateOutcome::Created => Ok(Registered::Fresh(metadata)),
            CreateOutcome::AlreadyExists => {
                debug!("book row created concurrently by another job");
                let book = self
                    .books
                    .get_by_hash(hash)
                    .await?
                    .ok_or_else(|| StoreError::BookNotFound(hash.to_string()))?;
                Ok(Registered::Existing(book))
            }
        }
    }

    async fn checkpoint(&self, job: &DownloadJob, progress: u8) {
        if let Err(e) = self
            .jobs
            .update_status(job.id, JobStatus::Downloading, progress, None)
            .await
        {
            warn!(progress, error = %e, "failed to record progress");
        }
    }

    async fn complete(&self, job: &DownloadJob, acquired: Acquired) -> JobOutcome {
        if let Err(e) = self.jobs.update_file_path(job.id, &acquired.file_path).await {
            warn!(error = %e, "failed to attach file path to job");
        }
        if let Err(e) = self
            .jobs
            .update_status(job.id, JobStatus::Completed, PROGRESS_DONE, None)
            .await
        {
            warn!(error = %e, "failed to mark job completed");
            return JobOutcome::Abandoned;
        }
        info!(path = %acquired.file_path.display(), reused = acquired.reused, "job completed");
        JobOutcome::Completed {
            file_path: acquired.file_path,
            reused: acquired.reused,
        }
    }

    /// Records an acquisition failure on both the book row and the job.
    async fn fail(&self, job: &DownloadJob, error: &AcquisitionError) -> JobOutcome {
        match self
            .books
            .update_status(&job.book_hash, BookStatus::Error, None)
            .await
        {
            Ok(()) | Err(StoreError::BookNotFound(_)) => {}
            Err(e) => warn!(error = %e, "failed to mark book as error"),
        }
        self.fail_job(job, error).await
    }

    /// Records a failure on the job only; the book row is left as it was.
    async fn fail_job(&self, job: &DownloadJob, error: &AcquisitionError) -> JobOutcome {
        let message = error.to_string();
        if let Err(e) = self
            .jobs
            .update_status(job.id, JobStatus::Failed, PROGRESS_FAILED, Some(&message))
            .await
        {
            warn!(error = %e, "failed to mark job failed");
            return JobOutcome::Abandoned;
        }
        warn!(error = %message, "job failed");
        JobOutcome::Failed { message }
    }
}

enum Registered {
    Fresh(BookMetadata),
    Existing(SavedBook),
}

/// Path of a ready book's file, if it is actually on disk.
async fn ready_file(book: &SavedBook) -> Option<PathBuf> {
    let path = book.file_path()?;
    tokio::fs::try_exists(&path)
        .await
        .unwrap_or(false)
        .then_some(path)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial file"),
    }
}
