//! Bookfetch Core Library
//!
//! Finds books in a shadow-library catalogue, then downloads them in the
//! background and tracks each request as a durable job.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`archive`] - search page scraping, metadata extraction, download resolver
//!   and streaming file fetch
//! - [`store`] - SQLite persistence for books, download jobs, and cached searches
//! - [`acquisition`] - request intake, the per-job state machine, and the
//!   scheduler loop
//! - [`filename`] - on-disk filename derivation shared by fetch and storage
//! - [`db`] - Database connection and schema management

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acquisition;
pub mod archive;
pub mod db;
pub mod filename;
pub mod store;

// Re-export commonly used types
pub use acquisition::{
    AcquisitionSummary, ArchiveSource, BookSource, JobOutcome, JobProcessor, RequestOutcome,
    Scheduler, SchedulerConfig, request_book,
};
pub use archive::{ArchiveClient, ArchiveError, ArchiveSettings, SearchResult};
pub use db::Database;
pub use store::{
    BookMetadata, BookStatus, BookStore, DownloadJob, JobStatus, JobStore, SearchCache, StoreError,
};
