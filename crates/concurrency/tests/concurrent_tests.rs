//! Concurrent/Multi-threaded Tests for optimist-concurrency
//!
//! These tests run transactions on real threads to exercise:
//!
//! 1. **Optimism** - disjoint transactions never conflict or block
//! 2. **Retry** - contended transactions all commit eventually
//! 3. **Exclusive mode** - a bulk loader blocks new transactions until it ends
//! 4. **Shutdown** - interrupted lock waits surface as errors
//!
//! ## Running These Tests
//!
//! ```bash
//! cargo test --test concurrent_tests
//! ```

use optimist_concurrency::{IsolationLevel, TransactionManager, TransactionStatus};
use optimist_core::{Backend, Quad, QuadPattern, StoreError, StoreResult, Term};
use optimist_storage::MemoryStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

fn quad(s: &str, p: &str, o: &str) -> Quad {
    Quad::new(Term::iri(s), Term::iri(p), Term::literal(o))
}

fn setup(large_block: usize) -> (MemoryStore, Arc<TransactionManager>) {
    let store = MemoryStore::new();
    let backend: Arc<dyn Backend> = Arc::new(store.clone());
    let manager =
        TransactionManager::with_options(backend, IsolationLevel::Serializable, large_block).unwrap();
    (store, manager)
}

// ============================================================================
// Optimism
// ============================================================================

#[test]
fn test_disjoint_transactions_all_commit() {
    const THREADS: usize = 8;
    let (store, manager) = setup(10_000);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> StoreResult<()> {
                let subject = format!("urn:s{}", i);
                let mut conn = manager.connection()?;
                conn.begin()?;
                barrier.wait();
                let pattern = QuadPattern::new(Some(Term::iri(&subject)), None, None);
                assert_eq!(conn.get_statements(&pattern, true)?.count(), 0);
                conn.add_statement(quad(&subject, "urn:p", "v"))?;
                barrier.wait();
                conn.commit()
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(store.len(), THREADS);
    let metrics = manager.metrics();
    assert_eq!(metrics.total_committed, THREADS as u64);
    assert_eq!(metrics.total_conflicts, 0);
}

// ============================================================================
// Retry
// ============================================================================

#[test]
fn test_contended_transactions_commit_with_retry() {
    const THREADS: usize = 6;
    let (store, manager) = setup(10_000);
    let barrier = Arc::new(Barrier::new(THREADS));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let conflicts = Arc::clone(&conflicts);
            thread::spawn(move || {
                let mut conn = manager.connection().unwrap();
                barrier.wait();
                for _ in 0..1_000 {
                    conn.begin().unwrap();
                    let seen = conn
                        .get_statements(&QuadPattern::new(None, Some(Term::iri("urn:counter")), None), true)
                        .unwrap()
                        .count();
                    conn.add_statement(quad(&format!("urn:s{}", i), "urn:counter", &seen.to_string()))
                        .unwrap();
                    match conn.commit() {
                        Ok(()) => return,
                        Err(e) if e.is_conflict() => {
                            conflicts.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                panic!("transaction never committed");
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Every committed counter value was read under serializable isolation,
    // so the values are exactly 0..THREADS
    let mut values: Vec<String> = store
        .quads()
        .into_iter()
        .filter_map(|q| q.object.as_literal().map(|l| l.value.clone()))
        .collect();
    values.sort_by_key(|v| v.parse::<usize>().unwrap());
    let expected: Vec<String> = (0..THREADS).map(|i| i.to_string()).collect();
    assert_eq!(values, expected);
    assert_eq!(
        manager.metrics().total_conflicts,
        conflicts.load(Ordering::Relaxed) as u64
    );
}

// ============================================================================
// Exclusive mode
// ============================================================================

#[test]
fn test_exclusive_loader_blocks_new_transactions() {
    let (store, manager) = setup(8);
    let mut loader = manager.connection().unwrap();
    loader.begin().unwrap();
    for i in 0..8 {
        loader.add_statement(quad("urn:bulk", "urn:p", &i.to_string())).unwrap();
    }
    assert_eq!(loader.status(), TransactionStatus::ActiveExclusive);

    let started = Arc::new(AtomicBool::new(false));
    let waiter = {
        let manager = Arc::clone(&manager);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            let mut conn = manager.connection().unwrap();
            conn.begin().unwrap();
            started.store(true, Ordering::SeqCst);
            let seen = conn.size(&QuadPattern::any()).unwrap();
            conn.commit().unwrap();
            seen
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!started.load(Ordering::SeqCst));
    loader.commit().unwrap();

    assert_eq!(waiter.join().unwrap(), 8);
    assert!(started.load(Ordering::SeqCst));
    assert_eq!(store.len(), 8);
}

#[test]
fn test_prepare_serializes_with_reads() {
    let (_store, manager) = setup(10_000);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut writer = manager.connection().unwrap();
    writer.begin().unwrap();
    writer.add_statement(quad("urn:a", "urn:p", "x")).unwrap();
    writer.prepare().unwrap();

    let reader = {
        let manager = Arc::clone(&manager);
        let order = Arc::clone(&order);
        thread::spawn(move || {
            let mut conn = manager.connection().unwrap();
            conn.begin().unwrap();
            let seen = conn.size(&QuadPattern::any()).unwrap();
            order.lock().push("read");
            conn.rollback();
            seen
        })
    };

    thread::sleep(Duration::from_millis(50));
    order.lock().push("commit");
    writer.commit().unwrap();

    // The read waited for the prepared writer to finish
    assert_eq!(reader.join().unwrap(), 1);
    assert_eq!(*order.lock(), vec!["commit", "read"]);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_interrupts_blocked_begin() {
    let (_store, manager) = setup(1);
    let mut loader = manager.connection().unwrap();
    loader.begin().unwrap();
    loader.add_statement(quad("urn:a", "urn:p", "x")).unwrap();
    assert_eq!(loader.status(), TransactionStatus::ActiveExclusive);

    let blocked = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            let mut conn = manager.connection().unwrap();
            conn.begin()
        })
    };
    thread::sleep(Duration::from_millis(20));
    manager.shutdown();

    let err = blocked.join().unwrap().unwrap_err();
    assert!(matches!(err, StoreError::Interrupted { .. }));
    assert!(err.is_backend());
    loader.rollback();
}
