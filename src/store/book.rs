//! Book records: one row per content hash.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::instrument;

use super::{Result, StoreError};
use crate::db::{Database, unix_now};
use crate::filename::{PLACEHOLDER_TITLE, book_filename};

/// Lifecycle of the physical file behind a book row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    /// An acquisition is under way (or was interrupted).
    Processing,
    /// The file has been written and `file_path` points at it.
    Ready,
    /// The last acquisition failed; eligible for the cleanup sweep.
    Error,
}

impl BookStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            _ => Err(format!("invalid book status: {s}")),
        }
    }
}

/// Descriptive fields persisted alongside a book row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub authors: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub format: Option<String>,
    pub size: Option<String>,
    pub cover_url: Option<String>,
    pub cover_data: Option<String>,
}

impl BookMetadata {
    /// Minimal record used when the metadata lookup fails.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            ..Self::default()
        }
    }

    /// Basename this book is saved under.
    #[must_use]
    pub fn filename(&self, hash: &str) -> String {
        book_filename(&self.title, self.format.as_deref().unwrap_or_default(), hash)
    }
}

/// Input for [`BookStore::create`].
#[derive(Debug, Clone)]
pub struct NewBook<'a> {
    pub hash: &'a str,
    pub metadata: &'a BookMetadata,
    pub status: BookStatus,
    pub requested_by: Option<i64>,
}

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new row was written.
    Created,
    /// A row with this hash already existed; nothing was written.
    AlreadyExists,
}

/// A persisted book row.
#[derive(Debug, Clone, FromRow)]
pub struct SavedBook {
    pub id: i64,
    pub hash: String,
    pub title: String,
    pub authors: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub format: Option<String>,
    pub size: Option<String>,
    pub cover_url: Option<String>,
    pub cover_data: Option<String>,
    /// Set only while the book is `ready`.
    pub file_path: Option<String>,
    /// Current status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    pub requested_by: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SavedBook {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Processing` if the status string is invalid, which sends
    /// the book back through acquisition rather than trusting its file.
    #[must_use]
    pub fn status(&self) -> BookStatus {
        self.status_str.parse().unwrap_or(BookStatus::Processing)
    }

    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        self.file_path.as_deref().map(PathBuf::from)
    }

    #[must_use]
    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            title: self.title.clone(),
            authors: self.authors.clone(),
            publisher: self.publisher.clone(),
            language: self.language.clone(),
            format: self.format.clone(),
            size: self.size.clone(),
            cover_url: self.cover_url.clone(),
            cover_data: self.cover_data.clone(),
        }
    }
}

/// `SQLite`-backed book storage.
///
/// `hash` is unique; concurrent creators are arbitrated by the constraint
/// rather than by in-process locking.
#[derive(Debug, Clone)]
pub struct BookStore {
    db: Database,
}

impl BookStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Looks up the row for `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<SavedBook>> {
        let book = sqlx::query_as::<_, SavedBook>("SELECT * FROM books WHERE hash = ?")
            .bind(hash)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(book)
    }

    /// Inserts a row unless one already exists for the hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails for any reason
    /// other than the hash already being present.
    #[instrument(skip(self, book), fields(hash = %book.hash, status = %book.status))]
    pub async fn create(&self, book: &NewBook<'_>) -> Result<CreateOutcome> {
        let now = unix_now();
        let meta = book.metadata;
        let result = sqlx::query(
            r"INSERT INTO books (
                hash, title, authors, publisher, language, format, size,
                cover_url, cover_data, status, requested_by, created_at, updated_at
              ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(hash) DO NOTHING",
        )
        .bind(book.hash)
        .bind(&meta.title)
        .bind(&meta.authors)
        .bind(&meta.publisher)
        .bind(&meta.language)
        .bind(&meta.format)
        .bind(&meta.size)
        .bind(&meta.cover_url)
        .bind(&meta.cover_data)
        .bind(book.status.as_str())
        .bind(book.requested_by)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            Ok(CreateOutcome::AlreadyExists)
        } else {
            Ok(CreateOutcome::Created)
        }
    }

    /// Sets the status and file path of a book.
    ///
    /// The path is only stored for [`BookStatus::Ready`]; any other status
    /// clears it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BookNotFound`] if no row has this hash.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, file_path))]
    pub async fn update_status(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE books SET status = ?, file_path = ?, updated_at = ? WHERE hash = ?",
        )
        .bind(status.as_str())
        .bind(stored_path(status, file_path))
        .bind(unix_now())
        .bind(hash)
        .execute(self.db.pool())
        .await?;

        check_affected(hash, result.rows_affected())
    }

    /// Sets status, file path, and every metadata column in one statement.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BookNotFound`] if no row has this hash.
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self, file_path, metadata))]
    pub async fn update_with_metadata(
        &self,
        hash: &str,
        status: BookStatus,
        file_path: Option<&Path>,
        metadata: &BookMetadata,
    ) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE books
              SET status = ?, file_path = ?, title = ?, authors = ?, publisher = ?,
                  language = ?, format = ?, size = ?, cover_url = ?, cover_data = ?,
                  updated_at = ?
              WHERE hash = ?",
        )
        .bind(status.as_str())
        .bind(stored_path(status, file_path))
        .bind(&metadata.title)
        .bind(&metadata.authors)
        .bind(&metadata.publisher)
        .bind(&metadata.language)
        .bind(&metadata.format)
        .bind(&metadata.size)
        .bind(&metadata.cover_url)
        .bind(&metadata.cover_data)
        .bind(unix_now())
        .bind(hash)
        .execute(self.db.pool())
        .await?;

        check_affected(hash, result.rows_affected())
    }

    /// Deletes rows in `status` created strictly before `cutoff` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_older_than(&self, cutoff: i64, status: BookStatus) -> Result<u64> {
        let result = sqlx::query("DELETE FROM books WHERE status = ? AND created_at < ?")
            .bind(status.as_str())
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Returns the number of books in a status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_status(&self, status: BookStatus) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM books WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

fn stored_path(status: BookStatus, file_path: Option<&Path>) -> Option<String> {
    if status == BookStatus::Ready {
        file_path.map(|p| p.to_string_lossy().into_owned())
    } else {
        None
    }
}

fn check_affected(hash: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::BookNotFound(hash.to_string()))
    } else {
        Ok(())
    }
}
