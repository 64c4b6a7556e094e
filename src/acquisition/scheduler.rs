//! Acquisition scheduler: the long-running poll loop.
//!
//! Each cycle sweeps old failures, recovers stalled jobs, claims a batch of
//! pending jobs, and hands each one to a [`JobProcessor`] task. In-flight
//! tasks are capped by a semaphore; on interruption the loop stops claiming
//! and drains in-flight work with a deadline.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use bookfetch_core::acquisition::{Scheduler, SchedulerConfig};
//!
//! let interrupted = Arc::new(AtomicBool::new(false));
//! let scheduler = Scheduler::new(SchedulerConfig::default(), processor, books, jobs)?;
//! let summary = scheduler.run(Arc::clone(&interrupted)).await?;
//! println!("completed {}, failed {}", summary.completed, summary.failed);
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::{JobOutcome, JobProcessor, SchedulerError};
use crate::db::unix_now;
use crate::store::{BookRepository, BookStatus, JobRepository, JobStatus, SearchCache};

/// Smallest allowed worker count.
pub const MIN_WORKERS: usize = 1;
/// Largest allowed worker count.
pub const MAX_WORKERS: usize = 64;

/// Jobs claimed per poll cycle.
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Concurrent job tasks.
pub const DEFAULT_WORKERS: usize = 8;

const INTERRUPT_POLL: Duration = Duration::from_millis(50);
const PANIC_MESSAGE: &str = "acquisition task panicked";

/// Timing and sizing for [`Scheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum jobs claimed per cycle.
    pub batch_size: usize,
    /// Maximum jobs processed at once.
    pub workers: usize,
    /// Sleep after a cycle that claimed nothing.
    pub idle_interval: Duration,
    /// Sleep after dispatching a batch.
    pub dispatch_interval: Duration,
    /// Sleep after a failed claim.
    pub error_retry_interval: Duration,
    /// Age after which `error` book rows are deleted.
    pub failed_book_retention: Duration,
    /// Age after which a `downloading` job is considered stalled and requeued.
    pub stale_job_timeout: Duration,
    /// How long shutdown waits for in-flight jobs before aborting them.
    pub drain_timeout: Duration,
    /// Whether the sweep also deletes expired cached searches.
    pub search_cache_cleanup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            idle_interval: Duration::from_secs(5),
            dispatch_interval: Duration::from_secs(2),
            error_retry_interval: Duration::from_secs(10),
            failed_book_retention: Duration::from_secs(24 * 60 * 60),
            stale_job_timeout: Duration::from_secs(30 * 60),
            drain_timeout: Duration::from_secs(5),
            search_cache_cleanup: true,
        }
    }
}

impl SchedulerConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(SchedulerError::InvalidConfig {
                field: "workers",
                reason: format!(
                    "{} is out of range, must be between {MIN_WORKERS} and {MAX_WORKERS}",
                    self.workers
                ),
            });
        }
        if self.batch_size == 0 {
            return Err(SchedulerError::InvalidConfig {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.stale_job_timeout.is_zero() {
            return Err(SchedulerError::InvalidConfig {
                field: "stale_job_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Counters updated by job tasks while the scheduler runs.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    reused: AtomicUsize,
    abandoned: AtomicUsize,
}

impl AcquisitionStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs that reached `completed`, including reused ones.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Completed jobs served from an existing file.
    #[must_use]
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::SeqCst)
    }

    /// Jobs dropped after a status write failed.
    #[must_use]
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    fn record(&self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Completed { reused, .. } => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                if *reused {
                    self.reused.fetch_add(1, Ordering::SeqCst);
                }
            }
            JobOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            JobOutcome::Abandoned => {
                self.abandoned.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn summary(&self) -> AcquisitionSummary {
        AcquisitionSummary {
            completed: self.completed(),
            failed: self.failed(),
            reused: self.reused(),
            abandoned: self.abandoned(),
        }
    }
}

/// Snapshot of [`AcquisitionStats`] returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionSummary {
    pub completed: usize,
    pub failed: usize,
    pub reused: usize,
    pub abandoned: usize,
}

/// Creates the download directory if it does not exist.
///
/// # Errors
///
/// Returns [`SchedulerError::DownloadDir`] if creation fails.
pub async fn ensure_download_dir(path: &Path) -> Result<(), SchedulerError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| SchedulerError::DownloadDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Poll loop that claims pending jobs and processes them concurrently.
pub struct Scheduler {
    config: SchedulerConfig,
    processor: JobProcessor,
    books: Arc<dyn BookRepository>,
    jobs: Arc<dyn JobRepository>,
    search_cache: Option<SearchCache>,
    semaphore: Arc<Semaphore>,
    stats: Arc<AcquisitionStats>,
}

impl Scheduler {
    /// Builds a scheduler after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] for out-of-range settings.
    pub fn new(
        config: SchedulerConfig,
        processor: JobProcessor,
        books: Arc<dyn BookRepository>,
        jobs: Arc<dyn JobRepository>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.workers)),
            config,
            processor,
            books,
            jobs,
            search_cache: None,
            stats: Arc::new(AcquisitionStats::new()),
        })
    }

    /// Also expire cached searches during the sweep.
    #[must_use]
    pub fn with_search_cache(mut self, cache: SearchCache) -> Self {
        self.search_cache = Some(cache);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// Runs until `interrupted` is set, then drains in-flight jobs.
    ///
    /// Claim failures and sweep failures are logged and retried on a later
    /// cycle; they never end the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::SemaphoreClosed`] if the worker semaphore is
    /// closed.
    #[instrument(skip(self, interrupted), fields(workers = self.config.workers, batch_size = self.config.batch_size))]
    pub async fn run(
        &self,
        interrupted: Arc<AtomicBool>,
    ) -> Result<AcquisitionSummary, SchedulerError> {
        info!("acquisition scheduler starting");

        match self.jobs.reset_in_flight().await {
            Ok(0) => {}
            Ok(count) => info!(count, "requeued jobs left in flight by a previous run"),
            Err(e) => warn!(error = %e, "failed to requeue in-flight jobs"),
        }

        let mut handles: Vec<(i64, JoinHandle<()>)> = Vec::new();

        while !interrupted.load(Ordering::SeqCst) {
            self.reap_finished(&mut handles).await;
            let owned: Vec<i64> = handles.iter().map(|(id, _)| *id).collect();
            self.sweep(&owned).await;

            let available = self.semaphore.available_permits();
            if available == 0 {
                debug!("all workers busy");
                sleep_interruptible(self.config.dispatch_interval, &interrupted).await;
                continue;
            }

            let limit = self.config.batch_size.min(available);
            let claimed = match self.jobs.claim_pending(limit).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!(error = %e, "failed to claim pending jobs");
                    sleep_interruptible(self.config.error_retry_interval, &interrupted).await;
                    continue;
                }
            };

            if claimed.is_empty() {
                sleep_interruptible(self.config.idle_interval, &interrupted).await;
                continue;
            }

            debug!(count = claimed.len(), "claimed jobs");
            for job in claimed {
                let permit = Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| SchedulerError::SemaphoreClosed)?;
                let processor = self.processor.clone();
                let stats = Arc::clone(&self.stats);
                let id = job.id;

                handles.push((
                    id,
                    tokio::spawn(async move {
                        let _permit = permit;
                        let outcome = processor.process(&job).await;
                        stats.record(&outcome);
                    }),
                ));
            }

            sleep_interruptible(self.config.dispatch_interval, &interrupted).await;
        }

        info!(in_flight = handles.len(), "interrupt received, draining jobs");
        self.drain(handles).await;

        let summary = self.stats.summary();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            reused = summary.reused,
            abandoned = summary.abandoned,
            "acquisition scheduler stopped"
        );
        Ok(summary)
    }

    /// Deletes old failed books and expired searches, then requeues stalled
    /// jobs other than the `owned` ones this scheduler is still running.
    async fn sweep(&self, owned: &[i64]) {
        let now = unix_now();

        let cutoff = now.saturating_sub(secs(self.config.failed_book_retention));
        match self.books.delete_older_than(cutoff, BookStatus::Error).await {
            Ok(0) => {}
            Ok(count) => info!(count, "deleted failed book records"),
            Err(e) => warn!(error = %e, "failed to delete failed book records"),
        }

        if self.config.search_cache_cleanup
            && let Some(cache) = &self.search_cache
        {
            match cache.delete_expired(now).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "deleted expired searches"),
                Err(e) => warn!(error = %e, "failed to delete expired searches"),
            }
        }

        let stale_cutoff = now.saturating_sub(secs(self.config.stale_job_timeout));
        match self.jobs.reset_stale(stale_cutoff, owned).await {
            Ok(0) => {}
            Ok(count) => warn!(count, "requeued stalled jobs"),
            Err(e) => warn!(error = %e, "failed to requeue stalled jobs"),
        }
    }

    async fn reap_finished(&self, handles: &mut Vec<(i64, JoinHandle<()>)>) {
        let (finished, running): (Vec<_>, Vec<_>) =
            handles.drain(..).partition(|(_, h)| h.is_finished());
        *handles = running;
        for (id, handle) in finished {
            self.settle(id, handle.await).await;
        }
    }

    async fn drain(&self, handles: Vec<(i64, JoinHandle<()>)>) {
        let deadline = Instant::now() + self.config.drain_timeout;
        for (id, mut handle) in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(result) => self.settle(id, result).await,
                Err(_) => {
                    warn!(job_id = id, "job still running at drain deadline; aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Records a panicked task's job as failed.
    async fn settle(&self, id: i64, result: Result<(), tokio::task::JoinError>) {
        let Err(e) = result else { return };
        if e.is_cancelled() {
            return;
        }
        error!(job_id = id, error = %e, "job task panicked");
        self.stats.increment_failed();
        if let Err(e) = self
            .jobs
            .update_status(id, JobStatus::Failed, 0, Some(PANIC_MESSAGE))
            .await
        {
            warn!(job_id = id, error = %e, "failed to mark panicked job failed");
        }
    }
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// Sleeps for `duration`, returning early once `interrupted` is set.
async fn sleep_interruptible(duration: Duration, interrupted: &AtomicBool) {
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            biased;
            () = &mut sleep => return,
            () = tokio::time::sleep(INTERRUPT_POLL) => {
                if interrupted.load(Ordering::SeqCst) {
                    return;
                }
            }
        }
    }
}
