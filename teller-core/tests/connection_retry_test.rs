//! Tests for opening the ledger database
//!
//! Run with: cargo test --test connection_retry_test -- --nocapture

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use teller_core::adapters::duckdb::DuckDbRepository;
use teller_core::Error;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Concurrent open attempts all succeed, with retries where needed
#[test]
fn test_concurrent_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.duckdb");

    // Create initial database
    {
        let repo = DuckDbRepository::new(&db_path, LOCK_TIMEOUT).unwrap();
        repo.ensure_schema().unwrap();
    }

    let barrier = Arc::new(Barrier::new(3));
    let db_path = Arc::new(db_path);

    let mut handles = vec![];
    for i in 0..3 {
        let barrier = Arc::clone(&barrier);
        let db_path = Arc::clone(&db_path);

        handles.push(thread::spawn(move || {
            barrier.wait();

            let start = Instant::now();
            match DuckDbRepository::new(&db_path, LOCK_TIMEOUT) {
                Ok(_repo) => {
                    println!("Thread {}: opened after {:?}", i, start.elapsed());
                    // Hold the connection briefly to create contention
                    thread::sleep(Duration::from_millis(100));
                    Ok(())
                }
                Err(e) => {
                    println!("Thread {}: FAILED after {:?}: {}", i, start.elapsed(), e);
                    Err(e.to_string())
                }
            }
        }));
    }

    let failures: Vec<String> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap().err())
        .collect();
    assert!(failures.is_empty(), "open failures: {:?}", failures);
}

/// Reopening applies no migration twice
#[test]
fn test_sequential_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_sequential.duckdb");

    for i in 0..5 {
        let repo = DuckDbRepository::new(&db_path, LOCK_TIMEOUT).unwrap();
        let result = repo.run_migrations().unwrap();
        if i == 0 {
            assert!(!result.applied.is_empty());
        } else {
            assert!(result.applied.is_empty(), "reapplied: {:?}", result.applied);
        }
    }
}

/// A path that cannot be a database fails without retrying forever
#[test]
fn test_unopenable_path_fails() {
    let temp_dir = TempDir::new().unwrap();
    // A directory is not a database file
    let start = Instant::now();
    let result = DuckDbRepository::new(temp_dir.path(), LOCK_TIMEOUT);
    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(matches!(
        result.err(),
        Some(Error::Database(_)) | Some(Error::Transient(_))
    ));
}
