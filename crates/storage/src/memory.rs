//! In-memory quad store
//!
//! Reference backend used by tests, benchmarks and embedders without a
//! persistent store.
//!
//! # Design
//!
//! - Quads: `BTreeSet` behind a `parking_lot::RwLock`, deterministic order
//! - Namespaces: `DashMap`, lock-free reads
//! - Connections write straight into the shared state and keep an undo
//!   journal; `commit` drops the journal, `rollback` replays it in reverse
//!
//! Uncommitted writes are therefore visible to other connections. The
//! isolation layer above never lets a second transaction read while one is
//! flushing, so this is acceptable for the intended use.

use crate::evaluate::{Evaluator, QuadSource};
use dashmap::DashMap;
use optimist_core::{
    Backend, BackendConnection, BindingIter, BindingSet, Dataset, Namespace, Quad, QuadIter,
    QuadPattern, StoreResult, Term, TupleExpr,
};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct QuadTable {
    quads: BTreeSet<Quad>,
}

impl QuadSource for QuadTable {
    fn matching(&self, pattern: &QuadPattern) -> Vec<Quad> {
        self.quads
            .iter()
            .filter(|q| pattern.matches(q))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    quads: RwLock<QuadTable>,
    namespaces: DashMap<String, String>,
    /// Count of committed units of work that changed something
    version: AtomicU64,
    /// Count of quads written through `add_quad`
    writes: AtomicU64,
}

/// Shared in-memory quad store
///
/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<StoreState>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with quads
    pub fn with_quads(quads: impl IntoIterator<Item = Quad>) -> Self {
        let store = Self::new();
        store.state.quads.write().quads.extend(quads);
        store
    }

    /// Number of quads currently stored
    pub fn len(&self) -> usize {
        self.state.quads.read().quads.len()
    }

    /// True if no quads are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the exact quad is stored
    pub fn contains(&self, quad: &Quad) -> bool {
        self.state.quads.read().quads.contains(quad)
    }

    /// Snapshot of all stored quads
    pub fn quads(&self) -> Vec<Quad> {
        self.state.quads.read().quads.iter().cloned().collect()
    }

    /// Number of committed units of work that changed the store
    pub fn version(&self) -> u64 {
        self.state.version.load(Ordering::Acquire)
    }

    /// Number of quads ever written through a connection's `add_quad`
    pub fn write_count(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }
}

impl Backend for MemoryStore {
    fn connection(&self) -> StoreResult<Box<dyn BackendConnection>> {
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            journal: Vec::new(),
        }))
    }
}

#[derive(Debug)]
enum Undo {
    Added(Quad),
    Removed(Quad),
    Namespace {
        prefix: String,
        previous: Option<String>,
    },
}

/// Connection to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<StoreState>,
    journal: Vec<Undo>,
}

impl MemoryConnection {
    fn record_namespace(&mut self, prefix: &str, previous: Option<String>) {
        self.journal.push(Undo::Namespace {
            prefix: prefix.to_string(),
            previous,
        });
    }
}

impl BackendConnection for MemoryConnection {
    fn add_quad(&mut self, quad: &Quad) -> StoreResult<()> {
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        if self.state.quads.write().quads.insert(quad.clone()) {
            self.journal.push(Undo::Added(quad.clone()));
        }
        Ok(())
    }

    fn remove_quads(&mut self, pattern: &QuadPattern) -> StoreResult<()> {
        let mut table = self.state.quads.write();
        let doomed = table.matching(pattern);
        for quad in doomed {
            table.quads.remove(&quad);
            self.journal.push(Undo::Removed(quad));
        }
        Ok(())
    }

    fn get_quads(&self, pattern: &QuadPattern, _include_inferred: bool) -> StoreResult<QuadIter> {
        let quads = self.state.quads.read().matching(pattern);
        Ok(Box::new(quads.into_iter().map(Ok)))
    }

    fn size(&self, pattern: &QuadPattern) -> StoreResult<u64> {
        let table = self.state.quads.read();
        Ok(table.quads.iter().filter(|q| pattern.matches(q)).count() as u64)
    }

    fn evaluate(
        &self,
        plan: &TupleExpr,
        dataset: Option<&Dataset>,
        bindings: &BindingSet,
        _include_inferred: bool,
    ) -> StoreResult<BindingIter> {
        let rows = {
            let table = self.state.quads.read();
            Evaluator::new(&*table, dataset).solutions(plan, bindings)
        };
        trace!(target: "optimist::store", rows = rows.len(), "Evaluated plan");
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn namespaces(&self) -> StoreResult<Vec<Namespace>> {
        let mut namespaces: Vec<Namespace> = self
            .state
            .namespaces
            .iter()
            .map(|entry| Namespace::new(entry.key().clone(), entry.value().clone()))
            .collect();
        namespaces.sort();
        Ok(namespaces)
    }

    fn namespace(&self, prefix: &str) -> StoreResult<Option<String>> {
        Ok(self.state.namespaces.get(prefix).map(|v| v.value().clone()))
    }

    fn set_namespace(&mut self, prefix: &str, name: &str) -> StoreResult<()> {
        let previous = self
            .state
            .namespaces
            .insert(prefix.to_string(), name.to_string());
        self.record_namespace(prefix, previous);
        Ok(())
    }

    fn remove_namespace(&mut self, prefix: &str) -> StoreResult<()> {
        if let Some((_, previous)) = self.state.namespaces.remove(prefix) {
            self.record_namespace(prefix, Some(previous));
        }
        Ok(())
    }

    fn clear_namespaces(&mut self) -> StoreResult<()> {
        let prefixes: Vec<String> = self
            .state
            .namespaces
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for prefix in prefixes {
            self.remove_namespace(&prefix)?;
        }
        Ok(())
    }

    fn context_ids(&self) -> StoreResult<Vec<Term>> {
        let table = self.state.quads.read();
        let mut seen = FxHashSet::default();
        Ok(table
            .quads
            .iter()
            .filter_map(|q| q.context.clone())
            .filter(|ctx| seen.insert(ctx.clone()))
            .collect())
    }

    fn commit(&mut self) -> StoreResult<()> {
        if !self.journal.is_empty() {
            self.state.version.fetch_add(1, Ordering::AcqRel);
            debug!(target: "optimist::store", changes = self.journal.len(), "Backend commit");
        }
        self.journal.clear();
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        if self.journal.is_empty() {
            return Ok(());
        }
        debug!(target: "optimist::store", changes = self.journal.len(), "Backend rollback");
        let mut table = self.state.quads.write();
        for undo in self.journal.drain(..).rev() {
            match undo {
                Undo::Added(quad) => {
                    table.quads.remove(&quad);
                }
                Undo::Removed(quad) => {
                    table.quads.insert(quad);
                }
                Undo::Namespace { prefix, previous } => match previous {
                    Some(name) => {
                        self.state.namespaces.insert(prefix, name);
                    }
                    None => {
                        self.state.namespaces.remove(&prefix);
                    }
                },
            }
        }
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.rollback()
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let _ = self.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str, o: &str, ctx: Option<&str>) -> Quad {
        Quad {
            subject: Term::iri(s),
            predicate: Term::iri("urn:p"),
            object: Term::literal(o),
            context: ctx.map(Term::iri),
        }
    }

    #[test]
    fn test_commit_keeps_writes() {
        let store = MemoryStore::new();
        let mut conn = store.connection().unwrap();
        conn.add_quad(&q("urn:a", "x", None)).unwrap();
        conn.commit().unwrap();
        drop(conn);
        assert!(store.contains(&q("urn:a", "x", None)));
        assert_eq!(store.version(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_rollback_restores_quads_and_namespaces() {
        let store = MemoryStore::with_quads(vec![q("urn:a", "x", None)]);
        let mut seed = store.connection().unwrap();
        seed.set_namespace("ex", "urn:ex#").unwrap();
        seed.commit().unwrap();

        let mut conn = store.connection().unwrap();
        conn.remove_quads(&QuadPattern::any()).unwrap();
        conn.add_quad(&q("urn:b", "y", Some("urn:g"))).unwrap();
        conn.set_namespace("ex", "urn:other#").unwrap();
        conn.set_namespace("new", "urn:new#").unwrap();
        conn.rollback().unwrap();

        assert_eq!(store.quads(), vec![q("urn:a", "x", None)]);
        assert_eq!(
            conn.namespaces().unwrap(),
            vec![Namespace::new("ex", "urn:ex#")]
        );
    }

    #[test]
    fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut conn = store.connection().unwrap();
            conn.add_quad(&q("urn:a", "x", None)).unwrap();
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_context_ids_and_clear() {
        let store = MemoryStore::with_quads(vec![
            q("urn:a", "x", Some("urn:g1")),
            q("urn:b", "y", Some("urn:g2")),
            q("urn:c", "z", None),
        ]);
        let mut conn = store.connection().unwrap();
        assert_eq!(conn.context_ids().unwrap().len(), 2);

        conn.clear(&[Some(Term::iri("urn:g1"))]).unwrap();
        conn.commit().unwrap();
        assert_eq!(conn.size(&QuadPattern::any()).unwrap(), 2);
        assert_eq!(conn.context_ids().unwrap(), vec![Term::iri("urn:g2")]);
    }
}
