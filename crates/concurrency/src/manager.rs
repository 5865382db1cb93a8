//! Shared store coordinator
//!
//! One `TransactionManager` exists per store. It owns the two lock managers,
//! the registry of active transactions and the store-level change listeners.
//!
//! # Locks
//!
//! - transaction lock: shared by every active transaction; held exclusively
//!   by a bulk-loading transaction in exclusive mode
//! - prepare lock: exclusive during one transaction's prepare until it ends;
//!   shared for the duration of every ordinary read and write
//!
//! # Prepare
//!
//! The preparing transaction's delta is checked against the read-set of
//! every other active transaction (forward check). The first affected read
//! marks that transaction with a conflict; a transaction already marked
//! instead records the delta in its changeset history. The preparing
//! transaction's own history is checked by [`TransactionManager::find_conflict`]
//! (backward check).
//!
//! # Lock ordering
//!
//! Prepare lock, then registry, then a transaction's state mutex. A state
//! mutex is never held while waiting on either lock manager or the registry.

use crate::changeset::ChangeSet;
use crate::delta::Delta;
use crate::event::{ChangeEvent, ChangeListener};
use crate::isolation::IsolationLevel;
use crate::lock::{Lock, LockManager};
use crate::metrics::{MetricCounters, TransactionMetrics};
use crate::operation::EvaluateOperation;
use crate::oracle::ConflictOracle;
use crate::state::TransactionState;
use crate::transaction::TransactionConnection;
use optimist_core::{Backend, BackendConnection, StoreError, StoreResult};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Buffered writes before a transaction tries to go exclusive
pub const DEFAULT_LARGE_BLOCK: usize = 10_000;

/// How a transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Committed,
    RolledBack,
    Conflicted,
}

struct Registration {
    state: Arc<Mutex<TransactionState>>,
    lock: Lock,
}

#[derive(Default)]
struct Registry {
    active: FxHashMap<u64, Registration>,
    prepared: Option<(u64, Lock)>,
}

impl Registry {
    /// The prepare lock, if `id` holds it
    fn take_prepared(&mut self, id: u64) -> Option<(u64, Lock)> {
        if self.prepared.as_ref().map_or(false, |(holder, _)| *holder == id) {
            self.prepared.take()
        } else {
            None
        }
    }
}

/// Coordinates the transactions of one store
pub struct TransactionManager {
    backend: Arc<dyn Backend>,
    isolation: IsolationLevel,
    large_block: usize,
    transaction_lock: Arc<LockManager>,
    prepare_lock: Arc<LockManager>,
    registry: Mutex<Registry>,
    listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
    next_txn_id: AtomicU64,
    counters: MetricCounters,
}

impl TransactionManager {
    /// Manager with serializable isolation and the default large block
    pub fn new(backend: Arc<dyn Backend>) -> Arc<Self> {
        Self::build(backend, IsolationLevel::default(), DEFAULT_LARGE_BLOCK)
    }

    /// Manager with explicit settings
    ///
    /// # Arguments
    /// * `backend` - Store every connection is opened against
    /// * `isolation` - Default isolation of new connections
    /// * `large_block` - Buffered writes between exclusive-mode attempts
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `large_block` is zero.
    pub fn with_options(
        backend: Arc<dyn Backend>,
        isolation: IsolationLevel,
        large_block: usize,
    ) -> StoreResult<Arc<Self>> {
        if large_block == 0 {
            return Err(StoreError::invalid_input("large_block must be positive"));
        }
        Ok(Self::build(backend, isolation, large_block))
    }

    fn build(backend: Arc<dyn Backend>, isolation: IsolationLevel, large_block: usize) -> Arc<Self> {
        Arc::new(Self {
            backend,
            isolation,
            large_block,
            transaction_lock: LockManager::new("transaction"),
            prepare_lock: LockManager::new("prepare"),
            registry: Mutex::new(Registry::default()),
            listeners: RwLock::new(Vec::new()),
            next_txn_id: AtomicU64::new(1),
            counters: MetricCounters::default(),
        })
    }

    /// Open a transaction connection
    ///
    /// # Errors
    ///
    /// Returns backend errors from opening the underlying connection.
    pub fn connection(self: &Arc<Self>) -> StoreResult<TransactionConnection> {
        let backend = self.backend.connection()?;
        Ok(TransactionConnection::new(Arc::clone(self), backend))
    }

    /// Default isolation of new connections
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Buffered writes between exclusive-mode attempts
    pub fn large_block(&self) -> usize {
        self.large_block
    }

    /// The shared backend
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Number of registered transactions
    pub fn active_count(&self) -> usize {
        self.registry.lock().active.len()
    }

    /// Transaction statistics
    pub fn metrics(&self) -> TransactionMetrics {
        self.counters.snapshot()
    }

    // ========================================================================
    // Lifecycle (called by connections)
    // ========================================================================

    pub(crate) fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a transaction, blocking while another holds the store
    /// exclusively
    pub(crate) fn begin(&self, id: u64, state: Arc<Mutex<TransactionState>>) -> StoreResult<()> {
        let lock = self.transaction_lock.read()?;
        self.registry
            .lock()
            .active
            .insert(id, Registration { state, lock });
        self.counters.record_start();
        debug!(target: "optimist::txn", txn_id = id, "Transaction started");
        Ok(())
    }

    /// Shared prepare lock held for the duration of one read or write
    pub(crate) fn read_lock(&self) -> StoreResult<Lock> {
        self.prepare_lock.read()
    }

    /// Try to take the store exclusively for `id`; never blocks
    ///
    /// Succeeds only if `id` is the sole active transaction.
    pub(crate) fn exclusive(&self, id: u64) -> bool {
        let upgraded = self
            .registry
            .lock()
            .active
            .get_mut(&id)
            .map_or(false, |registration| registration.lock.try_upgrade());
        if upgraded {
            self.counters.record_exclusive();
            info!(target: "optimist::txn", txn_id = id, "Upgraded to exclusive mode");
        }
        upgraded
    }

    /// Prepare `id` for commit
    ///
    /// Blocks until no other transaction is preparing, then marks every other
    /// active transaction whose reads the delta affects. The prepare lock is
    /// held until [`end`](Self::end).
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the wait is interrupted, or backend errors
    /// from the conflict scan (the prepare lock is released first).
    pub(crate) fn prepare(&self, id: u64, added: &Arc<Delta>, removed: &Arc<Delta>) -> StoreResult<()> {
        let lock = self.prepare_lock.write()?;
        let others: Vec<(u64, Arc<Mutex<TransactionState>>)> = {
            let mut registry = self.registry.lock();
            registry.prepared = Some((id, lock));
            if added.is_empty() && removed.is_empty() {
                return Ok(());
            }
            registry
                .active
                .iter()
                .filter(|(other, _)| **other != id)
                .map(|(other, registration)| (*other, Arc::clone(&registration.state)))
                .collect()
        };

        if let Err(e) = self.mark_affected(id, &others, added, removed) {
            warn!(target: "optimist::conflict", txn_id = id, error = %e, "Conflict scan failed");
            self.release_prepare(id);
            return Err(e);
        }
        Ok(())
    }

    fn mark_affected(
        &self,
        id: u64,
        others: &[(u64, Arc<Mutex<TransactionState>>)],
        added: &Arc<Delta>,
        removed: &Arc<Delta>,
    ) -> StoreResult<()> {
        let mut conn: Option<Box<dyn BackendConnection>> = None;
        let result = (|| -> StoreResult<()> {
            for (other, state) in others {
                let mut state = state.lock();
                if !state.status.is_active() {
                    continue;
                }
                if state.conflict.is_some() {
                    state
                        .changesets
                        .push(ChangeSet::new(Arc::clone(added), Arc::clone(removed)));
                    continue;
                }

                let mut affected = None;
                for op in &state.read_set {
                    if conn.is_none() {
                        conn = Some(self.backend.connection()?);
                    }
                    if let Some(conn) = conn.as_deref() {
                        if ConflictOracle::new(conn).affects_either(added, removed, op)? {
                            affected = Some(op.to_string());
                            break;
                        }
                    }
                }
                if let Some(operation) = affected {
                    info!(
                        target: "optimist::conflict",
                        txn_id = id,
                        affected_txn = other,
                        operation = %operation,
                        "Commit affects concurrent read"
                    );
                    state.conflict = Some(operation);
                    state
                        .changesets
                        .push(ChangeSet::new(Arc::clone(added), Arc::clone(removed)));
                }
            }
            Ok(())
        })();
        close_quietly(conn);
        result
    }

    /// First read in `changesets` affected by its entry's delta
    ///
    /// # Errors
    ///
    /// Returns backend errors from evaluating the reads.
    pub fn find_conflict(&self, changesets: &[ChangeSet]) -> StoreResult<Option<String>> {
        let mut conn: Option<Box<dyn BackendConnection>> = None;
        let result = (|| -> StoreResult<Option<String>> {
            for changeset in changesets {
                for op in changeset.reads() {
                    if conn.is_none() {
                        conn = Some(self.backend.connection()?);
                    }
                    if let Some(conn) = conn.as_deref() {
                        let oracle = ConflictOracle::new(conn);
                        if oracle.affects_either(changeset.added(), changeset.removed(), op)? {
                            return Ok(Some(op.to_string()));
                        }
                    }
                }
            }
            Ok(None)
        })();
        close_quietly(conn);
        result
    }

    /// Deregister `id`, releasing its transaction lock and, if it is
    /// preparing, the prepare lock
    pub(crate) fn end(&self, id: u64, outcome: Outcome) {
        let (registration, prepared) = {
            let mut registry = self.registry.lock();
            let registration = registry.active.remove(&id);
            (registration, registry.take_prepared(id))
        };
        drop(prepared);
        if registration.is_none() {
            return;
        }
        drop(registration);

        match outcome {
            Outcome::Committed => self.counters.record_commit(),
            Outcome::RolledBack => self.counters.record_abort(false),
            Outcome::Conflicted => self.counters.record_abort(true),
        }
        debug!(target: "optimist::txn", txn_id = id, outcome = ?outcome, "Transaction ended");
    }

    fn release_prepare(&self, id: u64) {
        let prepared = self.registry.lock().take_prepared(id);
        drop(prepared);
    }

    // ========================================================================
    // Change listeners
    // ========================================================================

    /// Register a store-level change listener
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove a listener previously registered with the same `Arc`
    pub fn remove_listener(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        let target = Arc::as_ptr(listener) as *const ();
        listeners.retain(|l| Arc::as_ptr(l) as *const () != target);
        listeners.len() != before
    }

    /// Number of registered change listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub(crate) fn notify(&self, event: &ChangeEvent) {
        let listeners: Vec<Arc<dyn ChangeListener>> = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.store_changed(event) {
                warn!(
                    target: "optimist::txn",
                    txn_id = event.txn_id,
                    error = %e,
                    "Change listener failed"
                );
            }
        }
    }

    /// True if `delta` affects the read `op` in the current store
    ///
    /// Lets change listeners decide staleness of their own cached reads.
    ///
    /// # Errors
    ///
    /// Returns backend errors from evaluating the read.
    pub fn affects(&self, delta: &Delta, op: &EvaluateOperation) -> StoreResult<bool> {
        if delta.is_empty() {
            return Ok(false);
        }
        let conn = self.backend.connection()?;
        let result = ConflictOracle::new(conn.as_ref()).affects(delta, op);
        close_quietly(Some(conn));
        result
    }

    /// Fail every blocked and future lock wait with `Interrupted`
    pub fn shutdown(&self) {
        info!(target: "optimist::txn", active = self.active_count(), "Shutting down transaction manager");
        self.transaction_lock.interrupt();
        self.prepare_lock.interrupt();
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("isolation", &self.isolation)
            .field("large_block", &self.large_block)
            .field("transaction_lock", &self.transaction_lock)
            .field("prepare_lock", &self.prepare_lock)
            .finish()
    }
}

fn close_quietly(conn: Option<Box<dyn BackendConnection>>) {
    if let Some(mut conn) = conn {
        if let Err(e) = conn.close() {
            warn!(target: "optimist::store", error = %e, "Failed to close oracle connection");
        }
    }
}
