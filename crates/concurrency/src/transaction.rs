//! Transaction connection
//!
//! A `TransactionConnection` wraps one backend connection and cycles through
//! transactions on it:
//!
//! ```text
//! inactive --begin--> active --(large block, sole transaction)--> active-exclusive
//! active | active-exclusive --prepare--> prepared --commit--> inactive
//! active | active-exclusive --prepare, conflict--> conflicted --commit (raises)--> inactive
//! any --rollback--> inactive
//! ```
//!
//! While `active`, writes are buffered in the added and removed deltas and
//! reads merge those deltas over the backend's result. Reads are recorded in
//! the read-set when the isolation level asks for snapshot semantics.
//!
//! While `active-exclusive`, the connection holds the store alone: writes go
//! straight to the backend and no conflict tracking is done.
//!
//! Outside a transaction, reads pass through to the backend and writes are
//! rejected.

use crate::delta::Delta;
use crate::event::{ChangeEvent, StatementListener};
use crate::exclusion::basic_nodes;
use crate::isolation::IsolationLevel;
use crate::lock::Lock;
use crate::manager::{Outcome, TransactionManager};
use crate::merger::DeltaMerger;
use crate::operation::EvaluateOperation;
use crate::state::{TransactionState, TransactionStatus};
use optimist_core::{
    BackendConnection, BindingIter, BindingSet, Dataset, Namespace, Quad, QuadIter, QuadPattern,
    StoreError, StoreResult, Term, TupleExpr,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transaction-scoped view of the store
pub struct TransactionConnection {
    manager: Arc<TransactionManager>,
    backend: Box<dyn BackendConnection>,
    state: Arc<Mutex<TransactionState>>,
    listeners: Vec<Arc<dyn StatementListener>>,
    isolation: IsolationLevel,
    /// Id of the open transaction, 0 when inactive
    txn_id: u64,
    /// Conflict raised by prepare, re-raised by commit
    pending_conflict: Option<String>,
}

impl TransactionConnection {
    pub(crate) fn new(manager: Arc<TransactionManager>, backend: Box<dyn BackendConnection>) -> Self {
        let isolation = manager.isolation();
        Self {
            manager,
            backend,
            state: Arc::new(Mutex::new(TransactionState::default())),
            listeners: Vec::new(),
            isolation,
            txn_id: 0,
            pending_conflict: None,
        }
    }

    /// Current lifecycle state
    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    /// True while a transaction is open
    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// Id of the open transaction
    pub fn txn_id(&self) -> Option<u64> {
        (self.txn_id != 0).then_some(self.txn_id)
    }

    /// Isolation of this connection's transactions
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Change the isolation of later transactions
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` while a transaction is open.
    pub fn set_isolation(&mut self, isolation: IsolationLevel) -> StoreResult<()> {
        let status = self.status();
        if status.is_active() {
            return Err(StoreError::illegal_state("change isolation", status));
        }
        self.isolation = isolation;
        Ok(())
    }

    /// Register a listener for this connection's logical writes
    ///
    /// A connection with statement listeners never upgrades to exclusive
    /// mode, so every write can be reported individually.
    pub fn add_statement_listener(&mut self, listener: Arc<dyn StatementListener>) {
        self.listeners.push(listener);
    }

    /// Remove a listener previously registered with the same `Arc`
    pub fn remove_statement_listener(&mut self, listener: &Arc<dyn StatementListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        before != self.listeners.len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start a transaction
    ///
    /// Blocks while another transaction holds the store exclusively.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if a transaction is already open, or
    /// `Interrupted` if the lock wait is interrupted.
    pub fn begin(&mut self) -> StoreResult<()> {
        let status = self.status();
        if status != TransactionStatus::Inactive {
            return Err(StoreError::illegal_state("begin", status));
        }
        let id = self.manager.next_txn_id();
        self.state.lock().reset(TransactionStatus::Active);
        if let Err(e) = self.manager.begin(id, Arc::clone(&self.state)) {
            self.state.lock().reset(TransactionStatus::Inactive);
            return Err(e);
        }
        self.txn_id = id;
        self.pending_conflict = None;
        Ok(())
    }

    /// Run the coordinator's prepare and check this transaction's reads
    ///
    /// Blocks until no other transaction is preparing. Afterwards the
    /// transaction is read-only until it commits or rolls back.
    ///
    /// # Errors
    ///
    /// Returns `IsolationConflict` (the transaction is rolled back and left
    /// `conflicted`), `IllegalState` outside an open transaction, or backend
    /// errors.
    pub fn prepare(&mut self) -> StoreResult<()> {
        let status = self.status();
        match status {
            TransactionStatus::Active | TransactionStatus::ActiveExclusive => {}
            TransactionStatus::Prepared => return Ok(()),
            TransactionStatus::Conflicted => {
                return Err(StoreError::conflict(self.pending_conflict.clone().unwrap_or_default()))
            }
            TransactionStatus::Inactive => return Err(StoreError::illegal_state("prepare", status)),
        }

        let (added, removed) = {
            let state = self.state.lock();
            (Arc::clone(&state.added), Arc::clone(&state.removed))
        };
        self.manager.prepare(self.txn_id, &added, &removed)?;
        drop((added, removed));

        let conflict = {
            let mut state = self.state.lock();
            state.status = TransactionStatus::Prepared;
            if state.is_read_only() && !state.exclusive {
                None
            } else if self.isolation.is_serializable() && state.conflict.is_some() {
                state.conflict.clone()
            } else if !state.changesets.is_empty() {
                self.manager.find_conflict(&state.changesets)?
            } else {
                None
            }
        };

        if let Some(operation) = conflict {
            warn!(
                target: "optimist::conflict",
                txn_id = self.txn_id,
                operation = %operation,
                "Isolation conflict at prepare"
            );
            self.discard(Outcome::Conflicted, TransactionStatus::Conflicted);
            self.pending_conflict = Some(operation.clone());
            return Err(StoreError::conflict(operation));
        }
        debug!(target: "optimist::txn", txn_id = self.txn_id, "Transaction prepared");
        Ok(())
    }

    /// Commit the open transaction
    ///
    /// Prepares if needed, flushes buffered changes (removals first), commits
    /// the backend, and notifies the store's change listeners. Does nothing
    /// outside a transaction.
    ///
    /// # Errors
    ///
    /// Returns `IsolationConflict` if prepare found a conflict (the
    /// connection is then inactive), or backend errors (the transaction stays
    /// open; roll it back).
    pub fn commit(&mut self) -> StoreResult<()> {
        match self.status() {
            TransactionStatus::Inactive => return Ok(()),
            TransactionStatus::Prepared => {}
            TransactionStatus::Active | TransactionStatus::ActiveExclusive | TransactionStatus::Conflicted => {
                if let Err(e) = self.prepare() {
                    if self.status() == TransactionStatus::Conflicted {
                        self.finish_conflicted();
                    }
                    return Err(e);
                }
            }
        }

        let id = self.txn_id;
        let event = {
            let mut state = self.state.lock();
            if state.exclusive {
                ChangeEvent::exclusive(id, state.exclusive_added, state.exclusive_removed)
            } else {
                let event =
                    ChangeEvent::buffered(id, Arc::clone(&state.added), Arc::clone(&state.removed));
                flush(self.backend.as_mut(), &mut state)?;
                event
            }
        };
        self.backend.commit()?;

        self.state.lock().reset(TransactionStatus::Inactive);
        self.txn_id = 0;
        self.manager.end(id, Outcome::Committed);
        info!(
            target: "optimist::txn",
            txn_id = id,
            exclusive = event.exclusive,
            "Transaction committed"
        );

        if !event.is_empty() {
            self.manager.notify(&event);
        }
        Ok(())
    }

    /// Abandon the open transaction
    ///
    /// Always succeeds; backend rollback failures are logged.
    pub fn rollback(&mut self) {
        match self.status() {
            TransactionStatus::Inactive => {}
            TransactionStatus::Conflicted => self.finish_conflicted(),
            _ => {
                self.discard(Outcome::RolledBack, TransactionStatus::Inactive);
                debug!(target: "optimist::txn", "Transaction rolled back");
            }
        }
    }

    /// Roll back any open transaction and close the backend connection
    ///
    /// # Errors
    ///
    /// Returns backend errors from closing.
    pub fn close(&mut self) -> StoreResult<()> {
        self.rollback();
        self.backend.close()
    }

    fn discard(&mut self, outcome: Outcome, next: TransactionStatus) {
        if let Err(e) = self.backend.rollback() {
            warn!(target: "optimist::txn", txn_id = self.txn_id, error = %e, "Backend rollback failed");
        }
        self.state.lock().reset(next);
        let id = self.txn_id;
        if next == TransactionStatus::Inactive {
            self.txn_id = 0;
        }
        self.manager.end(id, outcome);
    }

    fn finish_conflicted(&mut self) {
        self.state.lock().reset(TransactionStatus::Inactive);
        self.txn_id = 0;
        self.pending_conflict = None;
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Add a quad
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the transaction is active, or backend
    /// errors in exclusive mode.
    pub fn add_statement(&mut self, quad: Quad) -> StoreResult<()> {
        let _lock = self.write_lock("add statement")?;
        let mut state = self.state.lock();
        if let Some(ctx) = &quad.context {
            state.removed_contexts.remove(ctx);
        }
        if state.exclusive {
            self.backend.add_quad(&quad)?;
            state.exclusive_added = true;
            drop(state);
            self.fire(|l| l.statement_added(&quad));
            return Ok(());
        }

        if state.removed.contains(&quad) {
            state.removed_mut().remove(&quad);
        } else {
            state.added_mut().insert(quad.clone());
        }
        let size = state.added.len();
        drop(state);

        self.fire(|l| l.statement_added(&quad));
        if size > 0 && size % self.manager.large_block() == 0 {
            self.try_exclusive()?;
        }
        Ok(())
    }

    /// Add several quads
    ///
    /// # Errors
    ///
    /// Stops at the first failing add.
    pub fn add_all(&mut self, quads: impl IntoIterator<Item = Quad>) -> StoreResult<()> {
        for quad in quads {
            self.add_statement(quad)?;
        }
        Ok(())
    }

    /// Remove every visible quad matching `pattern`
    ///
    /// Buffered additions matching the pattern are cancelled; matching
    /// backend quads are buffered as removals.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the transaction is active, or backend
    /// errors.
    pub fn remove_statements(&mut self, pattern: &QuadPattern) -> StoreResult<()> {
        let _lock = self.write_lock("remove statements")?;
        let mut state = self.state.lock();
        if state.exclusive {
            let doomed = if self.listeners.is_empty() {
                Vec::new()
            } else {
                self.backend
                    .get_quads(pattern, false)?
                    .collect::<StoreResult<Vec<Quad>>>()?
            };
            self.backend.remove_quads(pattern)?;
            state.exclusive_removed = true;
            drop(state);
            for quad in &doomed {
                self.fire(|l| l.statement_removed(quad));
            }
            return Ok(());
        }

        if self.isolation.is_snapshot() {
            state.add_read(EvaluateOperation::read(pattern, false));
        }
        let mut gone: Vec<Quad> = state.added.matching(pattern).cloned().collect();
        for quad in &gone {
            state.added_mut().remove(quad);
        }

        let before = state.removed.len();
        for quad in self.backend.get_quads(pattern, false)? {
            let quad = quad?;
            if state.removed_mut().insert(quad.clone()) {
                gone.push(quad);
            }
        }
        let after = state.removed.len();
        drop(state);

        for quad in &gone {
            self.fire(|l| l.statement_removed(quad));
        }
        let block = self.manager.large_block();
        if after / block > before / block {
            self.try_exclusive()?;
        }
        Ok(())
    }

    /// Remove every quad in the given contexts (all contexts if empty)
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the transaction is active, or backend
    /// errors.
    pub fn clear(&mut self, contexts: &[Option<Term>]) -> StoreResult<()> {
        if self.state.lock().exclusive {
            let _lock = self.write_lock("clear")?;
            self.backend.clear(contexts)?;
            self.state.lock().exclusive_removed = true;
            return Ok(());
        }

        self.remove_statements(&QuadPattern::any().with_contexts(contexts.to_vec()))?;
        let cleared: Vec<Term> = if contexts.is_empty() {
            self.backend.context_ids()?
        } else {
            contexts.iter().flatten().cloned().collect()
        };
        let mut state = self.state.lock();
        if !state.exclusive {
            state.removed_contexts.extend(cleared);
        }
        Ok(())
    }

    /// Declare or replace a namespace prefix
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the transaction is active.
    pub fn set_namespace(&mut self, prefix: &str, name: &str) -> StoreResult<()> {
        let _lock = self.write_lock("set namespace")?;
        let mut state = self.state.lock();
        if state.exclusive {
            return self.backend.set_namespace(prefix, name);
        }
        state.removed_prefixes.insert(prefix.to_string());
        state
            .added_namespaces
            .insert(prefix.to_string(), name.to_string());
        Ok(())
    }

    /// Drop a namespace prefix
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the transaction is active.
    pub fn remove_namespace(&mut self, prefix: &str) -> StoreResult<()> {
        let _lock = self.write_lock("remove namespace")?;
        let mut state = self.state.lock();
        if state.exclusive {
            return self.backend.remove_namespace(prefix);
        }
        state.removed_prefixes.insert(prefix.to_string());
        state.added_namespaces.remove(prefix);
        Ok(())
    }

    /// Drop every namespace prefix
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` unless the transaction is active, or backend
    /// errors.
    pub fn clear_namespaces(&mut self) -> StoreResult<()> {
        let _lock = self.write_lock("clear namespaces")?;
        let mut state = self.state.lock();
        if state.exclusive {
            return self.backend.clear_namespaces();
        }
        for namespace in self.backend.namespaces()? {
            state.removed_prefixes.insert(namespace.prefix);
        }
        state.added_namespaces.clear();
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Quads matching `pattern`, including this transaction's changes
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` after prepare, or backend errors.
    pub fn get_statements(&mut self, pattern: &QuadPattern, include_inferred: bool) -> StoreResult<QuadIter> {
        let _lock = self.read_lock("get statements")?;
        let mut state = self.state.lock();
        if !state.status.is_active() || state.exclusive {
            drop(state);
            return self.backend.get_quads(pattern, include_inferred);
        }

        if self.isolation.is_snapshot() {
            state.add_read(EvaluateOperation::read(pattern, include_inferred));
        }
        let base = self.backend.get_quads(pattern, include_inferred)?;
        if state.is_read_only() {
            return Ok(base);
        }

        let added = Arc::clone(&state.added);
        let removed = Arc::clone(&state.removed);
        let local: Vec<Quad> = added.matching(pattern).cloned().collect();
        Ok(Box::new(
            base.filter(move |quad| match quad {
                Ok(quad) => !removed.contains(quad) && !added.contains(quad),
                Err(_) => true,
            })
            .chain(local.into_iter().map(Ok)),
        ))
    }

    /// True if any quad matches `pattern`
    ///
    /// # Errors
    ///
    /// Same as [`get_statements`](Self::get_statements).
    pub fn has_statement(&mut self, pattern: &QuadPattern, include_inferred: bool) -> StoreResult<bool> {
        match self.get_statements(pattern, include_inferred)?.next() {
            Some(quad) => quad.map(|_| true),
            None => Ok(false),
        }
    }

    /// Number of quads matching `pattern`, including this transaction's
    /// changes
    ///
    /// Computed as the backend count plus matching buffered additions minus
    /// matching buffered removals. A buffered addition of a quad the backend
    /// already holds is counted twice, so the result can exceed the number of
    /// quads [`get_statements`](Self::get_statements) yields.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` after prepare, or backend errors.
    pub fn size(&mut self, pattern: &QuadPattern) -> StoreResult<u64> {
        let _lock = self.read_lock("size")?;
        let mut state = self.state.lock();
        let base = self.backend.size(pattern)?;
        if !state.status.is_active() || state.exclusive {
            return Ok(base);
        }
        if self.isolation.is_snapshot() {
            state.add_read(EvaluateOperation::read(pattern, true));
        }
        let added = state.added.count_matching(pattern) as u64;
        let removed = state.removed.count_matching(pattern) as u64;
        Ok((base + added).saturating_sub(removed))
    }

    /// Evaluate a plan with this transaction's changes merged in
    ///
    /// Each maximal basic sub-plan of the evaluated plan is recorded as a
    /// read.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` after prepare, or backend errors.
    pub fn evaluate(
        &mut self,
        plan: &TupleExpr,
        dataset: Option<&Dataset>,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> StoreResult<BindingIter> {
        let _lock = self.read_lock("evaluate")?;
        let mut state = self.state.lock();
        if !state.status.is_active() || state.exclusive {
            drop(state);
            return self.backend.evaluate(plan, dataset, bindings, include_inferred);
        }

        let merged = if state.is_read_only() {
            None
        } else {
            let mut merger = DeltaMerger::new(&state.added, &state.removed, dataset, bindings);
            let merged = merger.merge(plan);
            merger.is_modified().then_some(merged)
        };
        let plan = merged.as_ref().unwrap_or(plan);

        if self.isolation.is_snapshot() {
            for node in basic_nodes(plan) {
                state.add_read(EvaluateOperation::new(
                    node,
                    dataset.cloned(),
                    bindings.clone(),
                    include_inferred,
                ));
            }
        }
        drop(state);
        self.backend.evaluate(plan, dataset, bindings, include_inferred)
    }

    /// Namespace declared for `prefix`
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` after prepare, or backend errors.
    pub fn namespace(&mut self, prefix: &str) -> StoreResult<Option<String>> {
        let _lock = self.read_lock("get namespace")?;
        let state = self.state.lock();
        if state.status.is_active() && !state.exclusive {
            if let Some(name) = state.added_namespaces.get(prefix) {
                return Ok(Some(name.clone()));
            }
            if state.removed_prefixes.contains(prefix) {
                return Ok(None);
            }
        }
        drop(state);
        self.backend.namespace(prefix)
    }

    /// All namespace declarations, sorted by prefix
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` after prepare, or backend errors.
    pub fn namespaces(&mut self) -> StoreResult<Vec<Namespace>> {
        let _lock = self.read_lock("get namespaces")?;
        let state = self.state.lock();
        let mut merged: BTreeMap<String, String> = self
            .backend
            .namespaces()?
            .into_iter()
            .map(|ns| (ns.prefix, ns.name))
            .collect();
        if state.status.is_active() && !state.exclusive {
            merged.retain(|prefix, _| !state.removed_prefixes.contains(prefix));
            merged.extend(state.added_namespaces.clone());
        }
        Ok(merged
            .into_iter()
            .map(|(prefix, name)| Namespace::new(prefix, name))
            .collect())
    }

    /// Named graphs containing at least one quad
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` after prepare, or backend errors.
    pub fn context_ids(&mut self) -> StoreResult<Vec<Term>> {
        let _lock = self.read_lock("get context ids")?;
        let state = self.state.lock();
        let backend = self.backend.context_ids()?;
        if !state.status.is_active() || state.exclusive {
            return Ok(backend);
        }
        let mut seen = BTreeSet::new();
        let ids: Vec<Term> = state
            .added
            .iter()
            .filter_map(|quad| quad.context.clone())
            .chain(
                backend
                    .into_iter()
                    .filter(|ctx| !state.removed_contexts.contains(ctx)),
            )
            .filter(|ctx| seen.insert(ctx.clone()))
            .collect();
        Ok(ids)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Shared prepare lock for a read; none outside a transaction
    fn read_lock(&self, operation: &'static str) -> StoreResult<Option<Lock>> {
        match self.status() {
            TransactionStatus::Inactive => Ok(None),
            TransactionStatus::Active | TransactionStatus::ActiveExclusive => {
                self.manager.read_lock().map(Some)
            }
            status => Err(StoreError::illegal_state(operation, status)),
        }
    }

    /// Shared prepare lock for a write
    fn write_lock(&self, operation: &'static str) -> StoreResult<Lock> {
        let status = self.status();
        if !status.is_writable() {
            return Err(StoreError::illegal_state(operation, status));
        }
        self.manager.read_lock()
    }

    /// Upgrade to exclusive mode if no one else is active
    ///
    /// A transaction already marked with a conflict keeps buffering so its
    /// prepare still fails.
    fn try_exclusive(&mut self) -> StoreResult<()> {
        if !self.listeners.is_empty() || self.state.lock().conflict.is_some() {
            return Ok(());
        }
        if !self.manager.exclusive(self.txn_id) {
            return Ok(());
        }
        let mut state = self.state.lock();
        state.status = TransactionStatus::ActiveExclusive;
        state.exclusive = true;
        let had_added = !state.added.is_empty();
        let had_removed = !state.removed.is_empty() || !state.removed_contexts.is_empty();
        state.exclusive_added |= had_added;
        state.exclusive_removed |= had_removed;
        state.forget_reads();
        flush(self.backend.as_mut(), &mut state)
    }

    fn fire(&self, notify: impl Fn(&dyn StatementListener)) {
        for listener in &self.listeners {
            notify(listener.as_ref());
        }
    }
}

impl Drop for TransactionConnection {
    fn drop(&mut self) {
        if self.is_active() {
            self.rollback();
        }
    }
}

impl std::fmt::Debug for TransactionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionConnection")
            .field("txn_id", &self.txn_id)
            .field("status", &self.status())
            .field("isolation", &self.isolation)
            .finish()
    }
}

/// Apply buffered changes to the backend, then empty the buffers
///
/// Order: removed prefixes, added namespaces, cleared contexts, removed
/// quads, added quads. A failure part way leaves the earlier changes applied
/// to the backend connection.
fn flush(backend: &mut dyn BackendConnection, state: &mut TransactionState) -> StoreResult<()> {
    for prefix in &state.removed_prefixes {
        backend.remove_namespace(prefix)?;
    }
    state.removed_prefixes.clear();
    for (prefix, name) in &state.added_namespaces {
        backend.set_namespace(prefix, name)?;
    }
    state.added_namespaces.clear();

    if !state.removed_contexts.is_empty() {
        let contexts: Vec<Option<Term>> = state.removed_contexts.iter().cloned().map(Some).collect();
        backend.clear(&contexts)?;
        state.removed_contexts.clear();
    }

    let removed = std::mem::replace(&mut state.removed, Arc::new(Delta::new()));
    for quad in removed.iter() {
        backend.remove_quads(&QuadPattern::exact(quad))?;
    }
    let added = std::mem::replace(&mut state.added, Arc::new(Delta::new()));
    for quad in added.iter() {
        backend.add_quad(quad)?;
    }
    debug!(
        target: "optimist::txn",
        added = added.len(),
        removed = removed.len(),
        "Flushed buffered changes"
    );
    Ok(())
}
