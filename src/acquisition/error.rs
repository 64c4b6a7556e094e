//! Error types for acquisition, scheduling, and request intake.

use std::path::PathBuf;

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::store::StoreError;

/// Why a single job failed. The `Display` text is what lands in the job's
/// `error_msg`.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Archive lookup, resolver, or transfer failure; message is passed through.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Reading or writing the book row failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that stop the scheduler from starting or running.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A configuration value is out of range.
    #[error("invalid scheduler setting {field}: {reason}")]
    InvalidConfig {
        /// Setting name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// The download directory could not be created.
    #[error("cannot create download directory {path}: {source}")]
    DownloadDir {
        /// Directory path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Worker semaphore was closed unexpectedly.
    #[error("worker semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Errors returned when accepting a download request.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The hash is blank or contains characters a content hash never has.
    #[error(
        "invalid book hash '{0}'\n  Suggestion: Use the hash shown in search results (letters and digits only)"
    )]
    InvalidHash(String),

    /// Storage failure while checking or enqueueing.
    #[error(transparent)]
    Store(#[from] StoreError),
}
