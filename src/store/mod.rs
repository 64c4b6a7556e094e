//! Persistence for books, download jobs, and cached searches.
//!
//! - [`BookStore`] - one row per content hash; insert-if-absent on `hash`
//! - [`JobStore`] - download jobs (pending → downloading → completed/failed)
//! - [`SearchCache`] - search result lists addressable by index
//! - [`BookRepository`] / [`JobRepository`] - seams used by acquisition
//!
//! # Example
//!
//! ```ignore
//! use bookfetch_core::store::{BookStore, JobStore};
//! use bookfetch_core::Database;
//! use std::path::Path;
//!
//! let db = Database::new(Path::new("bookfetch.db")).await?;
//! let jobs = JobStore::new(db.clone());
//! let id = jobs.enqueue(1, "d41d8cd98f00b204e9800998ecf8427e").await?;
//! let claimed = jobs.claim_pending(5).await?;
//! ```

mod book;
mod error;
mod job;
mod repository;
mod search_cache;

pub use book::{BookMetadata, BookStatus, BookStore, CreateOutcome, NewBook, SavedBook};
pub use error::{StoreDbErrorKind, StoreError};
pub use job::{DownloadJob, JobStatus, JobStore};
pub use repository::{BookRepository, JobRepository};
pub use search_cache::{CachedSearch, DEFAULT_SEARCH_TTL, SearchCache};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
