//! Backend traits
//!
//! The isolation layer treats the backing quad store as a black box reached
//! through these two traits. A [`Backend`] hands out connections; each
//! [`BackendConnection`] is owned by exactly one transaction connection and
//! carries its own unit of work (`commit` / `rollback`).
//!
//! Thread safety: `Backend` is shared across threads (`Send + Sync`), while a
//! connection only needs to move between threads (`Send`).

use crate::algebra::TupleExpr;
use crate::bindings::{BindingSet, Dataset};
use crate::error::StoreResult;
use crate::types::{Namespace, Quad, QuadPattern, Term};

/// Lazy sequence of quads; dropping it early is always safe
pub type QuadIter = Box<dyn Iterator<Item = StoreResult<Quad>> + Send>;

/// Lazy sequence of solution rows; dropping it early is always safe
pub type BindingIter = Box<dyn Iterator<Item = StoreResult<BindingSet>> + Send>;

/// A quad store that hands out connections
pub trait Backend: Send + Sync {
    /// Open a new connection with its own unit of work
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot provide a connection.
    fn connection(&self) -> StoreResult<Box<dyn BackendConnection>>;
}

/// A connection to the backing store
pub trait BackendConnection: Send {
    /// Insert a quad
    fn add_quad(&mut self, quad: &Quad) -> StoreResult<()>;

    /// Delete every quad matching the pattern
    fn remove_quads(&mut self, pattern: &QuadPattern) -> StoreResult<()>;

    /// Quads matching the pattern
    fn get_quads(&self, pattern: &QuadPattern, include_inferred: bool) -> StoreResult<QuadIter>;

    /// Number of quads matching the pattern
    fn size(&self, pattern: &QuadPattern) -> StoreResult<u64>;

    /// Evaluate a query plan
    ///
    /// # Arguments
    /// * `plan` - Plan to evaluate
    /// * `dataset` - Graphs to evaluate against (`None` for the whole store)
    /// * `bindings` - Input bindings
    /// * `include_inferred` - Whether inferred quads participate
    fn evaluate(
        &self,
        plan: &TupleExpr,
        dataset: Option<&Dataset>,
        bindings: &BindingSet,
        include_inferred: bool,
    ) -> StoreResult<BindingIter>;

    /// All namespace declarations
    fn namespaces(&self) -> StoreResult<Vec<Namespace>>;

    /// Namespace IRI for a prefix
    fn namespace(&self, prefix: &str) -> StoreResult<Option<String>>;

    /// Declare or replace a prefix
    fn set_namespace(&mut self, prefix: &str, name: &str) -> StoreResult<()>;

    /// Drop a prefix declaration
    fn remove_namespace(&mut self, prefix: &str) -> StoreResult<()>;

    /// Drop every prefix declaration
    fn clear_namespaces(&mut self) -> StoreResult<()>;

    /// Named graphs that contain at least one quad
    fn context_ids(&self) -> StoreResult<Vec<Term>>;

    /// Delete all quads in the given contexts (all contexts if empty)
    fn clear(&mut self, contexts: &[Option<Term>]) -> StoreResult<()> {
        self.remove_quads(&QuadPattern::any().with_contexts(contexts.to_vec()))
    }

    /// Make this connection's changes durable and visible
    fn commit(&mut self) -> StoreResult<()>;

    /// Undo this connection's uncommitted changes
    fn rollback(&mut self) -> StoreResult<()>;

    /// Release the connection
    fn close(&mut self) -> StoreResult<()>;
}
