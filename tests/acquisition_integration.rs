//! End-to-end acquisition scenarios: archive mock, real stores, real scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bookfetch_core::store::NewBook;
use bookfetch_core::{
    ArchiveSource, BookMetadata, BookStatus, BookStore, Database, JobOutcome, JobProcessor,
    JobStatus, JobStore, RequestOutcome, Scheduler, SchedulerConfig, request_book,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::MockServer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;
use support::{FIRST_HASH, client_for, mount_file, mount_resolver, mount_search_page};

struct World {
    books: BookStore,
    jobs: JobStore,
    db: Database,
    processor: JobProcessor,
    downloads: TempDir,
    _db_dir: TempDir,
}

async fn world(server: &MockServer) -> World {
    let db_dir = TempDir::new().expect("temp dir");
    let db = Database::new(&db_dir.path().join("bookfetch.db"))
        .await
        .expect("db");
    let books = BookStore::new(db.clone());
    let jobs = JobStore::new(db.clone());
    let downloads = TempDir::new().expect("temp dir");
    let processor = JobProcessor::new(
        Arc::new(books.clone()),
        Arc::new(jobs.clone()),
        Arc::new(ArchiveSource::new(client_for(server), "test-key")),
        downloads.path(),
    );
    World {
        books,
        jobs,
        db,
        processor,
        downloads,
        _db_dir: db_dir,
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        idle_interval: Duration::from_millis(25),
        dispatch_interval: Duration::from_millis(25),
        error_retry_interval: Duration::from_millis(25),
        ..SchedulerConfig::default()
    }
}

async fn wait_for_terminal(jobs: &JobStore, id: i64) -> JobStatus {
    for _ in 0..250 {
        let job = jobs.get(id).await.expect("get").expect("job exists");
        let status = job.status().expect("status");
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn test_search_then_refused_download_fails_job_and_book() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_search_page(&server).await;
    mount_resolver(
        &server,
        FIRST_HASH,
        json!({ "download_url": "", "error": "no copies available" }),
    )
    .await;
    let w = world(&server).await;

    let results = client_for(&server)
        .search("programming golang")
        .await
        .expect("search");
    assert!(!results.is_empty());
    let hash = results[0].hash.clone();

    let RequestOutcome::Enqueued { job_id } = request_book(&w.books, &w.jobs, 1, &hash)
        .await
        .expect("request")
    else {
        panic!("book should not be available yet");
    };

    let scheduler = Arc::new(
        Scheduler::new(
            fast_config(),
            w.processor.clone(),
            Arc::new(w.books.clone()),
            Arc::new(w.jobs.clone()),
        )
        .expect("scheduler"),
    );
    let interrupted = Arc::new(AtomicBool::new(false));
    let runner = {
        let scheduler = Arc::clone(&scheduler);
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move { scheduler.run(interrupted).await })
    };

    let status = wait_for_terminal(&w.jobs, job_id).await;
    interrupted.store(true, Ordering::SeqCst);
    let summary = runner.await.expect("join").expect("run");

    assert_eq!(status, JobStatus::Failed);
    let job = w.jobs.get(job_id).await.expect("get").expect("job");
    assert_eq!(job.error_msg.as_deref(), Some("no copies available"));
    let book = w.books.get_by_hash(&hash).await.expect("get").expect("book");
    assert_eq!(book.status(), BookStatus::Error);
    assert_eq!(book.title, "The Go Programming Language");
    assert!(book.file_path.is_none());
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn test_ready_book_is_never_fetched_twice() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_search_page(&server).await;
    mount_resolver(
        &server,
        FIRST_HASH,
        json!({ "download_url": format!("{}/files/golang.epub", server.uri()) }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/golang.epub"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"epub bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    let w = world(&server).await;

    let first = w.jobs.enqueue(1, FIRST_HASH).await.expect("enqueue");
    let second = w.jobs.enqueue(2, FIRST_HASH).await.expect("enqueue");
    let claimed = w.jobs.claim_pending(10).await.expect("claim");
    assert_eq!(claimed.len(), 2);

    let a = w.processor.process(&claimed[0]).await;
    let b = w.processor.process(&claimed[1]).await;

    let expected = w.downloads.path().join("The Go Programming Language.epub");
    assert_eq!(
        a,
        JobOutcome::Completed {
            file_path: expected.clone(),
            reused: false
        }
    );
    assert_eq!(
        b,
        JobOutcome::Completed {
            file_path: expected.clone(),
            reused: true
        }
    );
    for id in [first, second] {
        let job = w.jobs.get(id).await.expect("get").expect("job");
        assert_eq!(job.status().expect("status"), JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.file_path.as_deref(), expected.to_str());
    }
    let book = w.books.get_by_hash(FIRST_HASH).await.expect("get").expect("book");
    assert_eq!(book.file_path(), Some(expected));
}

#[tokio::test]
async fn test_concurrent_jobs_for_new_hash_leave_one_row() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_search_page(&server).await;
    mount_resolver(
        &server,
        FIRST_HASH,
        json!({ "download_url": format!("{}/files/golang.epub", server.uri()) }),
    )
    .await;
    mount_file(&server, "/files/golang.epub", b"epub bytes").await;
    let w = world(&server).await;

    let a = w.jobs.enqueue(1, FIRST_HASH).await.expect("enqueue");
    let b = w.jobs.enqueue(2, FIRST_HASH).await.expect("enqueue");
    let claimed = w.jobs.claim_pending(10).await.expect("claim");

    let (oa, ob) = tokio::join!(
        w.processor.process(&claimed[0]),
        w.processor.process(&claimed[1])
    );

    assert!(matches!(oa, JobOutcome::Completed { .. }), "{oa:?}");
    assert!(matches!(ob, JobOutcome::Completed { .. }), "{ob:?}");
    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM books WHERE hash = ?")
        .bind(FIRST_HASH)
        .fetch_one(w.db.pool())
        .await
        .expect("count");
    assert_eq!(rows, 1);
    let book = w.books.get_by_hash(FIRST_HASH).await.expect("get").expect("book");
    assert_eq!(book.status(), BookStatus::Ready);
    for id in [a, b] {
        let job = w.jobs.get(id).await.expect("get").expect("job");
        assert_eq!(job.status().expect("status"), JobStatus::Completed);
    }
}

#[tokio::test]
async fn test_cleanup_sweep_removes_only_old_error_rows() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let w = world(&server).await;
    let meta = BookMetadata::placeholder();
    for (hash, status) in [
        ("olderror", BookStatus::Error),
        ("oldready", BookStatus::Ready),
        ("oldprocessing", BookStatus::Processing),
        ("freshERROR", BookStatus::Error),
    ] {
        w.books
            .create(&NewBook {
                hash,
                metadata: &meta,
                status,
                requested_by: None,
            })
            .await
            .expect("create");
    }
    let day = 24 * 60 * 60;
    let cutoff = bookfetch_core::db::unix_now() - day;
    sqlx::query("UPDATE books SET created_at = ? WHERE hash LIKE 'old%'")
        .bind(cutoff - 60)
        .execute(w.db.pool())
        .await
        .expect("backdate");

    let deleted = w
        .books
        .delete_older_than(cutoff, BookStatus::Error)
        .await
        .expect("sweep");

    assert_eq!(deleted, 1);
    assert!(w.books.get_by_hash("olderror").await.expect("get").is_none());
    for hash in ["oldready", "oldprocessing", "freshERROR"] {
        assert!(
            w.books.get_by_hash(hash).await.expect("get").is_some(),
            "{hash} should survive"
        );
    }
}
