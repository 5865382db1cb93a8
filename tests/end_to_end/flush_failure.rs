//! Backend Failure Tests
//!
//! A backend error while flushing propagates unchanged and leaves the
//! transaction prepared; rolling back releases the prepare lock and undoes
//! whatever part of the flush reached the backend.

use crate::common::*;
use optimist::{Backend, Database, MemoryStore, OptimistConfig, QuadPattern, TransactionStatus};
use std::sync::Arc;

fn flaky_db() -> (FlakyStore, Arc<Database>) {
    let store = FlakyStore::new(MemoryStore::new());
    let backend: Arc<dyn Backend> = Arc::new(store.clone());
    let db = Database::with_backend(backend, OptimistConfig::default()).unwrap();
    (store, db)
}

#[test]
fn test_failed_flush_leaves_transaction_prepared() {
    let (store, db) = flaky_db();
    let mut conn = db.connection().unwrap();
    conn.begin().unwrap();
    for i in 0..3 {
        conn.add_statement(quad("urn:a", "urn:p", &i.to_string())).unwrap();
    }

    store.set_budget(1);
    let err = conn.commit().unwrap_err();
    assert!(err.is_backend());
    assert_eq!(conn.status(), TransactionStatus::Prepared);

    // Part of the flush reached the backend
    assert_eq!(store.inner.len(), 1);

    conn.rollback();
    assert_eq!(conn.status(), TransactionStatus::Inactive);
    assert!(store.inner.is_empty());
}

#[test]
fn test_rollback_after_failed_flush_releases_prepare() {
    let (store, db) = flaky_db();
    let mut conn = db.connection().unwrap();
    conn.begin().unwrap();
    conn.add_statement(quad("urn:a", "urn:p", "x")).unwrap();
    store.set_budget(0);
    assert!(conn.commit().is_err());
    conn.rollback();

    // Another transaction can prepare and commit
    store.set_budget(usize::MAX);
    db.add(vec![quad("urn:b", "urn:p", "y")]).unwrap();
    assert_eq!(db.size(&QuadPattern::any()).unwrap(), 1);
}

#[test]
fn test_closure_transaction_cleans_up_after_backend_error() {
    let (store, db) = flaky_db();
    store.set_budget(0);
    let err = db.add(vec![quad("urn:a", "urn:p", "x")]).unwrap_err();
    assert!(err.is_backend());
    assert!(store.inner.is_empty());
    assert_eq!(db.manager().active_count(), 0);

    store.set_budget(usize::MAX);
    db.add(vec![quad("urn:a", "urn:p", "x")]).unwrap();
    assert_eq!(store.inner.len(), 1);
}

#[test]
fn test_write_after_prepare_is_illegal() {
    let (_store, db) = flaky_db();
    let mut conn = db.connection().unwrap();
    conn.begin().unwrap();
    conn.prepare().unwrap();
    let err = conn.add_statement(quad("urn:a", "urn:p", "x")).unwrap_err();
    assert!(err.is_illegal_state());
    conn.commit().unwrap();
}
