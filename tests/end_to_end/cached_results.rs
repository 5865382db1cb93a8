//! Cached Result Invalidation Tests
//!
//! A downstream cache keeps the result of one read and asks the manager
//! whether each committed delta affects it, instead of rerunning the read
//! after every commit.

use crate::common::*;
use optimist::{
    BindingSet, ChangeEvent, ChangeListener, Database, EvaluateOperation, StoreResult,
    TransactionManager,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Caches the row count of one plan
struct CachedCount {
    op: EvaluateOperation,
    manager: Weak<TransactionManager>,
    value: Mutex<Option<usize>>,
}

impl CachedCount {
    fn new(plan: optimist::TupleExpr, manager: &Arc<TransactionManager>) -> Arc<Self> {
        Arc::new(Self {
            op: EvaluateOperation::new(plan, None, BindingSet::new(), true),
            manager: Arc::downgrade(manager),
            value: Mutex::new(None),
        })
    }

    fn get(&self, db: &Database) -> StoreResult<usize> {
        let mut value = self.value.lock();
        if let Some(count) = *value {
            return Ok(count);
        }
        let count = db
            .evaluate(self.op.plan(), self.op.dataset(), self.op.bindings(), true)?
            .len();
        *value = Some(count);
        Ok(count)
    }

    fn is_cached(&self) -> bool {
        self.value.lock().is_some()
    }
}

impl ChangeListener for CachedCount {
    fn store_changed(&self, event: &ChangeEvent) -> StoreResult<()> {
        let Some(manager) = self.manager.upgrade() else {
            return Ok(());
        };
        let stale = match (&event.added, &event.removed) {
            (Some(added), Some(removed)) => {
                manager.affects(added, &self.op)? || manager.affects(removed, &self.op)?
            }
            _ => true,
        };
        if stale {
            *self.value.lock() = None;
        }
        Ok(())
    }
}

#[test]
fn test_cache_survives_unrelated_commits() {
    let db = Database::open_in_memory().unwrap();
    db.add(vec![quad("urn:a", "urn:name", "Ann")]).unwrap();

    let cache = CachedCount::new(by_predicate("urn:name"), db.manager());
    db.add_listener(cache.clone());
    assert_eq!(cache.get(&db).unwrap(), 1);

    db.add(vec![quad("urn:a", "urn:age", "40")]).unwrap();
    assert!(cache.is_cached());
    assert_eq!(cache.get(&db).unwrap(), 1);
}

#[test]
fn test_cache_invalidated_by_relevant_commit() {
    let db = Database::open_in_memory().unwrap();
    let cache = CachedCount::new(by_predicate("urn:name"), db.manager());
    db.add_listener(cache.clone());
    assert_eq!(cache.get(&db).unwrap(), 0);

    db.add(vec![quad("urn:b", "urn:name", "Bob")]).unwrap();
    assert!(!cache.is_cached());
    assert_eq!(cache.get(&db).unwrap(), 1);

    db.remove(&predicate("urn:name")).unwrap();
    assert!(!cache.is_cached());
    assert_eq!(cache.get(&db).unwrap(), 0);
}

#[test]
fn test_rolled_back_transaction_notifies_nobody() {
    let db = Database::open_in_memory().unwrap();
    let cache = CachedCount::new(by_predicate("urn:name"), db.manager());
    db.add_listener(cache.clone());
    cache.get(&db).unwrap();

    let mut conn = db.connection().unwrap();
    conn.begin().unwrap();
    conn.add_statement(quad("urn:b", "urn:name", "Bob")).unwrap();
    conn.rollback();

    assert!(cache.is_cached());
}
