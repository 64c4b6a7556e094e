//! Download jobs: one row per user request for a book.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::instrument;

use super::{Result, StoreError};
use crate::db::{Database, unix_now};

/// Status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed by the scheduler.
    Pending,
    /// Claimed and being worked on.
    Downloading,
    /// File is available at `file_path`.
    Completed,
    /// Acquisition failed; `error_msg` says why.
    Failed,
}

impl JobStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// A persisted download job.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadJob {
    pub id: i64,
    pub user_id: i64,
    pub book_hash: String,
    /// Current status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    pub progress: i64,
    pub error_msg: Option<String>,
    pub file_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DownloadJob {
    /// Returns the parsed status enum.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidStatus`] if the stored value is unknown.
    pub fn status(&self) -> Result<JobStatus> {
        self.status_str.parse().map_err(|_| StoreError::InvalidStatus {
            status: self.status_str.clone(),
        })
    }
}

/// `SQLite`-backed job storage.
#[derive(Debug, Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a `pending` job for `user_id` and `book_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self))]
    pub async fn enqueue(&self, user_id: i64, book_hash: &str) -> Result<i64> {
        let now = unix_now();
        let (id,): (i64,) = sqlx::query_as(
            r"INSERT INTO download_jobs (user_id, book_hash, status, progress, created_at, updated_at)
              VALUES (?, ?, ?, 0, ?, ?)
              RETURNING id",
        )
        .bind(user_id)
        .bind(book_hash)
        .bind(JobStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(self.db.pool())
        .await?;
        Ok(id)
    }

    /// Claims up to `limit` pending jobs, oldest first.
    ///
    /// Claimed jobs are moved to `downloading` in the same statement, so two
    /// schedulers sharing a database never receive the same job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn claim_pending(&self, limit: usize) -> Result<Vec<DownloadJob>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut jobs = sqlx::query_as::<_, DownloadJob>(
            r"UPDATE download_jobs
              SET status = ?, progress = 0, updated_at = ?
              WHERE id IN (
                  SELECT id FROM download_jobs
                  WHERE status = ?
                  ORDER BY created_at ASC, id ASC
                  LIMIT ?
              )
              RETURNING *",
        )
        .bind(JobStatus::Downloading.as_str())
        .bind(unix_now())
        .bind(JobStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        // RETURNING order is unspecified
        jobs.sort_by_key(|job| (job.created_at, job.id));
        Ok(jobs)
    }

    /// Sets status, progress, and error message of a non-terminal job.
    ///
    /// `progress` is clamped to `0..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if the job does not exist,
    /// [`StoreError::InvalidTransition`] if it is already completed or failed,
    /// or [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, error_msg))]
    pub async fn update_status(
        &self,
        id: i64,
        status: JobStatus,
        progress: u8,
        error_msg: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE download_jobs
              SET status = ?, progress = ?, error_msg = ?, updated_at = ?
              WHERE id = ? AND status NOT IN (?, ?)",
        )
        .bind(status.as_str())
        .bind(i64::from(progress.min(100)))
        .bind(error_msg)
        .bind(unix_now())
        .bind(id)
        .bind(JobStatus::Completed.as_str())
        .bind(JobStatus::Failed.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.get(id).await? {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => Err(StoreError::InvalidTransition {
                id,
                from: job.status_str,
                to: status.to_string(),
            }),
        }
    }

    /// Attaches the downloaded file path to a job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] if no job exists with the given ID.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, file_path), fields(path = %file_path.display()))]
    pub async fn update_file_path(&self, id: i64, file_path: &Path) -> Result<()> {
        let result =
            sqlx::query("UPDATE download_jobs SET file_path = ?, updated_at = ? WHERE id = ?")
                .bind(file_path.to_string_lossy().into_owned())
                .bind(unix_now())
                .bind(id)
                .execute(self.db.pool())
                .await?;

        if result.rows_affected() == 0 {
            Err(StoreError::JobNotFound(id))
        } else {
            Ok(())
        }
    }

    /// Fetches a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<DownloadJob>> {
        let job = sqlx::query_as::<_, DownloadJob>("SELECT * FROM download_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(job)
    }

    /// Returns a user's jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<DownloadJob>> {
        let jobs = sqlx::query_as::<_, DownloadJob>(
            r"SELECT * FROM download_jobs
              WHERE user_id = ?
              ORDER BY created_at DESC, id DESC
              LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;
        Ok(jobs)
    }

    /// Returns the number of jobs in a status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM download_jobs WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(self.db.pool())
                .await?;
        Ok(count)
    }

    /// Returns `downloading` jobs last touched before `cutoff` to `pending`.
    ///
    /// Covers jobs whose worker stalled on a failed status write. Jobs in
    /// `owned` are still being worked on by the caller and are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, owned), fields(owned = owned.len()))]
    pub async fn reset_stale(&self, cutoff: i64, owned: &[i64]) -> Result<u64> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE download_jobs SET status = ");
        query
            .push_bind(JobStatus::Pending.as_str())
            .push(", progress = 0, updated_at = ")
            .push_bind(unix_now())
            .push(" WHERE status = ")
            .push_bind(JobStatus::Downloading.as_str())
            .push(" AND updated_at < ")
            .push_bind(cutoff);
        if !owned.is_empty() {
            query.push(" AND id NOT IN (");
            let mut ids = query.separated(", ");
            for id in owned {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");
        }

        let result = query.build().execute(self.db.pool()).await?;
        Ok(result.rows_affected())
    }

    /// Returns every `downloading` job to `pending`.
    ///
    /// Used at scheduler start, when no worker can still own a job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn reset_in_flight(&self) -> Result<u64> {
        self.reset_stale(i64::MAX, &[]).await
    }
}
