//! Shared test utilities for the integration test suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]

use optimist::{
    Backend, BackendConnection, BindingSet, Dataset, MemoryStore, Quad, QuadPattern,
    StatementPattern, StoreError, StoreResult, Term, TupleExpr, Var,
};
use optimist_core::{BindingIter, Namespace, QuadIter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Builders
// ============================================================================

pub fn quad(s: &str, p: &str, o: &str) -> Quad {
    Quad::new(Term::iri(s), Term::iri(p), Term::literal(o))
}

pub fn quad_in(s: &str, p: &str, o: &str, ctx: &str) -> Quad {
    Quad::in_context(Term::iri(s), Term::iri(p), Term::literal(o), Term::iri(ctx))
}

pub fn predicate(p: &str) -> QuadPattern {
    QuadPattern::new(None, Some(Term::iri(p)), None)
}

pub fn by_predicate(p: &str) -> TupleExpr {
    TupleExpr::pattern(StatementPattern::new(
        Var::new("s"),
        Var::constant(Term::iri(p)),
        Var::new("o"),
    ))
}

// ============================================================================
// Flaky backend
// ============================================================================

/// Backend whose connections fail `add_quad` once a shared write budget is
/// spent. Everything else passes through to a `MemoryStore`.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    budget: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            budget: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// Allow `writes` more successful `add_quad` calls
    pub fn set_budget(&self, writes: usize) {
        self.budget.store(writes, Ordering::SeqCst);
    }
}

impl Backend for FlakyStore {
    fn connection(&self) -> StoreResult<Box<dyn BackendConnection>> {
        Ok(Box::new(FlakyConnection {
            inner: self.inner.connection()?,
            budget: Arc::clone(&self.budget),
        }))
    }
}

struct FlakyConnection {
    inner: Box<dyn BackendConnection>,
    budget: Arc<AtomicUsize>,
}

impl BackendConnection for FlakyConnection {
    fn add_quad(&mut self, quad: &Quad) -> StoreResult<()> {
        let spent = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1));
        if spent.is_err() {
            return Err(StoreError::backend("write budget exhausted"));
        }
        self.inner.add_quad(quad)
    }

    fn remove_quads(&mut self, pattern: &QuadPattern) -> StoreResult<()> {
        self.inner.remove_quads(pattern)
    }

    fn get_quads(&self, pattern: &QuadPattern, include_inferred: bool) -> StoreResult<QuadIter> {
        self.inner.get_quads(pattern, include_inferred)
    }

    fn size(&self, pattern: &QuadPattern) -> StoreResult<u64> {
        self.inner.size(pattern)
    }

    fn evaluate(
        &self,
        plan: &TupleExpr,
        dataset: Option<&Dataset>,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> StoreResult<BindingIter> {
        self.inner.evaluate(plan, dataset, bindings, include_inferred)
    }

    fn namespaces(&self) -> StoreResult<Vec<Namespace>> {
        self.inner.namespaces()
    }

    fn namespace(&self, prefix: &str) -> StoreResult<Option<String>> {
        self.inner.namespace(prefix)
    }

    fn set_namespace(&mut self, prefix: &str, name: &str) -> StoreResult<()> {
        self.inner.set_namespace(prefix, name)
    }

    fn remove_namespace(&mut self, prefix: &str) -> StoreResult<()> {
        self.inner.remove_namespace(prefix)
    }

    fn clear_namespaces(&mut self) -> StoreResult<()> {
        self.inner.clear_namespaces()
    }

    fn context_ids(&self) -> StoreResult<Vec<Term>> {
        self.inner.context_ids()
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.inner.close()
    }
}
