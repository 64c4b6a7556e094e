//! Turning download requests into files on disk.
//!
//! - [`request_book`] - validates a hash and enqueues a job (or reports an
//!   existing file)
//! - [`JobProcessor`] - drives one claimed job to `completed` or `failed`
//! - [`Scheduler`] - poll loop claiming batches and running them on a capped
//!   worker pool
//! - [`BookSource`] - metadata and download seam, implemented by
//!   [`ArchiveSource`]

mod error;
mod intake;
mod processor;
mod scheduler;
mod source;

#[cfg(test)]
mod test_support;

pub use error::{AcquisitionError, IntakeError, SchedulerError};
pub use intake::{RequestOutcome, request_book, validate_hash};
pub use processor::{JobOutcome, JobProcessor};
pub use scheduler::{
    AcquisitionStats, AcquisitionSummary, DEFAULT_BATCH_SIZE, DEFAULT_WORKERS, MAX_WORKERS,
    MIN_WORKERS, Scheduler, SchedulerConfig, ensure_download_dir,
};
pub use source::{ArchiveSource, BookSource};
