//! CLI entry point for bookfetch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use bookfetch_core::acquisition::{ensure_download_dir, validate_hash};
use bookfetch_core::store::DEFAULT_SEARCH_TTL;
use bookfetch_core::{
    ArchiveClient, ArchiveSource, BookStore, Database, JobProcessor, JobStore, RequestOutcome,
    Scheduler, SearchCache, SearchResult, request_book,
};
use clap::Parser;
use tracing::{debug, info};

mod cli;
mod config;

use cli::{Args, Command, RequestArgs, SearchArgs, StatusArgs};
use config::{CliOverrides, RuntimeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = config::load_config(args.config.as_deref())?;
    let runtime = RuntimeConfig::resolve(
        &CliOverrides {
            download_dir: args.download_dir.clone(),
            database_path: args.database.clone(),
        },
        file_config.as_ref(),
        config::process_env,
    );
    runtime.validate()?;

    ensure_download_dir(&runtime.download_dir).await?;
    if let Some(parent) = runtime.database_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create database directory '{}'", parent.display()))?;
    }
    let db = Database::new(&runtime.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", runtime.database_path.display()))?;

    let result = match &args.command {
        Command::Serve => serve(&runtime, &db).await,
        Command::Search(search) => run_search(&runtime, &db, search).await,
        Command::Request(request) => run_request(&db, request).await,
        Command::Status(status) => run_status(&db, status).await,
    };

    db.close().await;
    result
}

async fn serve(runtime: &RuntimeConfig, db: &Database) -> Result<()> {
    let Some(secret_key) = runtime.secret_key.clone() else {
        bail!(
            "No archive secret key configured\n  Suggestion: set {} or `secret_key` in the config file",
            config::ENV_SECRET_KEY
        );
    };

    let client = ArchiveClient::new(&runtime.archive)?;
    let books = Arc::new(BookStore::new(db.clone()));
    let jobs = Arc::new(JobStore::new(db.clone()));
    let processor = JobProcessor::new(
        books.clone(),
        jobs.clone(),
        Arc::new(ArchiveSource::new(client, secret_key)),
        runtime.download_dir.clone(),
    );
    let scheduler = Scheduler::new(runtime.scheduler.clone(), processor, books, jobs)?
        .with_search_cache(SearchCache::new(db.clone()));

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    info!(
        download_dir = %runtime.download_dir.display(),
        base_url = %runtime.archive.base_url,
        "bookfetch serving"
    );
    let summary = scheduler.run(interrupted).await?;
    println!(
        "Stopped: {} completed ({} already on disk), {} failed, {} abandoned",
        summary.completed, summary.reused, summary.failed, summary.abandoned
    );
    Ok(())
}

async fn run_search(runtime: &RuntimeConfig, db: &Database, args: &SearchArgs) -> Result<()> {
    let query = args.query_string();
    let client = ArchiveClient::new(&runtime.archive)?;
    let results = client
        .search(&query)
        .await
        .with_context(|| format!("Search for '{query}' failed"))?;

    if results.is_empty() {
        println!("No results for '{query}'");
        return Ok(());
    }

    let search_id = SearchCache::new(db.clone())
        .store(args.user, &query, &results, DEFAULT_SEARCH_TTL)
        .await?;

    for (index, result) in results.iter().enumerate() {
        println!("{}", format_result(index, result));
    }
    println!();
    println!(
        "Search id {search_id}. Request one with: bookfetch request --search-id {search_id} --index <N>"
    );
    Ok(())
}

fn format_result(index: usize, result: &SearchResult) -> String {
    let title = result.title.as_deref().unwrap_or("(untitled)");
    let mut line = format!("[{index}] {title} ({})", result.hash);
    if let Some(authors) = &result.authors {
        line.push_str(&format!("\n    by {authors}"));
    }
    let details: Vec<&str> = [&result.language, &result.format, &result.size]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .collect();
    if !details.is_empty() {
        line.push_str(&format!("\n    {}", details.join(" · ")));
    }
    line
}

async fn run_request(db: &Database, args: &RequestArgs) -> Result<()> {
    let hash = match (&args.hash, args.search_id, args.index) {
        (Some(hash), _, _) => validate_hash(hash)?.to_string(),
        (None, Some(search_id), Some(index)) => {
            let Some(result) = SearchCache::new(db.clone())
                .result_at(args.user, search_id, index)
                .await?
            else {
                bail!(
                    "Search {search_id} has no result {index}\n  Suggestion: run `bookfetch search` again, cached searches expire after an hour"
                );
            };
            result.hash
        }
        _ => bail!("Provide a hash or --search-id with --index"),
    };

    let books = BookStore::new(db.clone());
    let jobs = JobStore::new(db.clone());
    match request_book(&books, &jobs, args.user, &hash).await? {
        RequestOutcome::AlreadyAvailable { file_path } => {
            println!("Already downloaded: {}", file_path.display());
        }
        RequestOutcome::Enqueued { job_id } => {
            println!("Queued job {job_id} for {hash}");
        }
    }
    Ok(())
}

async fn run_status(db: &Database, args: &StatusArgs) -> Result<()> {
    let jobs = JobStore::new(db.clone());
    let Some(job) = jobs.get(args.job_id).await? else {
        bail!("Job {} not found", args.job_id);
    };

    println!(
        "Job {}: {} ({}%) for {}",
        job.id, job.status_str, job.progress, job.book_hash
    );
    if let Some(error) = &job.error_msg {
        println!("  Error: {error}");
    }
    if let Some(path) = &job.file_path {
        println!("  File: {path}");
    }
    Ok(())
}
