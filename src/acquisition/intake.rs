//! Accepting download requests.

use std::path::PathBuf;

use tracing::{debug, info, instrument};

use super::IntakeError;
use crate::store::{BookStatus, BookStore, JobStore};

/// What happened to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The book is already on disk; no job was created.
    AlreadyAvailable { file_path: PathBuf },
    /// A pending job was created.
    Enqueued { job_id: i64 },
}

/// Checks that `hash` looks like a content hash.
///
/// # Errors
///
/// Returns [`IntakeError::InvalidHash`] for blank hashes or ones containing
/// anything other than ASCII letters and digits.
pub fn validate_hash(hash: &str) -> Result<&str, IntakeError> {
    let trimmed = hash.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(IntakeError::InvalidHash(hash.to_string()));
    }
    Ok(trimmed)
}

/// Records a user's request for a book.
///
/// A book that is `ready` with its file present is returned directly.
/// Everything else becomes a pending job for the scheduler.
///
/// # Errors
///
/// Returns [`IntakeError::InvalidHash`] for malformed hashes and
/// [`IntakeError::Store`] if the lookup or insert fails.
#[instrument(skip(books, jobs))]
pub async fn request_book(
    books: &BookStore,
    jobs: &JobStore,
    user_id: i64,
    hash: &str,
) -> Result<RequestOutcome, IntakeError> {
    let hash = validate_hash(hash)?;

    if let Some(book) = books.get_by_hash(hash).await?
        && book.status() == BookStatus::Ready
        && let Some(path) = book.file_path()
        && tokio::fs::try_exists(&path).await.unwrap_or(false)
    {
        debug!(path = %path.display(), "book already available");
        return Ok(RequestOutcome::AlreadyAvailable { file_path: path });
    }

    let job_id = jobs.enqueue(user_id, hash).await?;
    info!(job_id, "download request enqueued");
    Ok(RequestOutcome::Enqueued { job_id })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::Database;
    use crate::store::{BookMetadata, JobStatus, NewBook};

    async fn stores() -> (BookStore, JobStore) {
        let db = Database::new_in_memory().await.unwrap();
        (BookStore::new(db.clone()), JobStore::new(db))
    }

    #[test]
    fn test_validate_hash_accepts_md5() {
        assert_eq!(
            validate_hash(" d41d8cd98f00b204e9800998ecf8427e ").unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_validate_hash_rejects_blank_and_paths() {
        for bad in ["", "   ", "../etc/passwd", "abc/def", "a b"] {
            assert!(
                matches!(validate_hash(bad), Err(IntakeError::InvalidHash(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_request_unknown_book_enqueues() {
        let (books, jobs) = stores().await;
        let outcome = request_book(&books, &jobs, 3, "abc123").await.unwrap();
        let RequestOutcome::Enqueued { job_id } = outcome else {
            panic!("expected enqueue, got {outcome:?}");
        };
        let job = jobs.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.user_id, 3);
        assert_eq!(job.book_hash, "abc123");
        assert_eq!(job.status().unwrap(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_request_ready_book_returns_file() {
        let (books, jobs) = stores().await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Dune.epub");
        std::fs::write(&path, b"book").unwrap();
        let meta = BookMetadata::placeholder();
        books
            .create(&NewBook {
                hash: "abc123",
                metadata: &meta,
                status: BookStatus::Processing,
                requested_by: None,
            })
            .await
            .unwrap();
        books
            .update_status("abc123", BookStatus::Ready, Some(&path))
            .await
            .unwrap();

        let outcome = request_book(&books, &jobs, 3, "abc123").await.unwrap();

        assert_eq!(outcome, RequestOutcome::AlreadyAvailable { file_path: path });
        assert!(jobs.list_for_user(3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_ready_book_without_file_enqueues() {
        let (books, jobs) = stores().await;
        let meta = BookMetadata::placeholder();
        books
            .create(&NewBook {
                hash: "abc123",
                metadata: &meta,
                status: BookStatus::Processing,
                requested_by: None,
            })
            .await
            .unwrap();
        books
            .update_status(
                "abc123",
                BookStatus::Ready,
                Some(std::path::Path::new("/nonexistent/bookfetch/Dune.epub")),
            )
            .await
            .unwrap();

        let outcome = request_book(&books, &jobs, 3, "abc123").await.unwrap();

        assert!(matches!(outcome, RequestOutcome::Enqueued { .. }));
    }
}
