//! Conflict Oracle: does a delta affect a recorded read?
//!
//! The read's plan is rewritten with the delta injected as additional quads
//! that bind a marker variable. If the rewrite touches nothing, the delta
//! cannot reach the read. Otherwise the rewritten plan is evaluated against
//! the backend; any row carrying the marker was produced with help from the
//! delta, so the read's result would differ.
//!
//! Removed quads are checked the same way: they still exist in the backend
//! at prepare time, and a read that can see them is affected by their
//! removal.
//!
//! Over-reporting is acceptable (it costs a retry); missing an affected read
//! is not.

use crate::delta::Delta;
use crate::merger::DeltaMerger;
use crate::operation::EvaluateOperation;
use optimist_core::{BackendConnection, BindingSet, StoreResult, Term};
use tracing::trace;

/// Binding name of the marker carried by injected rows
pub const MARKER: &str = "-delta-";

/// Answers whether deltas affect reads, evaluating against one backend
/// connection
pub struct ConflictOracle<'a> {
    conn: &'a dyn BackendConnection,
}

impl<'a> ConflictOracle<'a> {
    /// Oracle evaluating through `conn`
    pub fn new(conn: &'a dyn BackendConnection) -> Self {
        Self { conn }
    }

    /// True if injecting `delta` produces rows the read did not see
    ///
    /// # Errors
    ///
    /// Returns backend errors from evaluating the rewritten plan.
    pub fn affects(&self, delta: &Delta, op: &EvaluateOperation) -> StoreResult<bool> {
        if delta.is_empty() {
            return Ok(false);
        }
        let marker = BindingSet::with(MARKER, Term::boolean(true));
        let mut merger = DeltaMerger::with_marker(delta, marker, op.dataset(), op.bindings());
        let plan = merger.merge(op.plan());
        if !merger.is_modified() {
            return Ok(false);
        }

        let rows = self
            .conn
            .evaluate(&plan, op.dataset(), op.bindings(), op.include_inferred())?;
        for row in rows {
            if row?.contains(MARKER) {
                trace!(target: "optimist::conflict", operation = %op, "Delta visible to read");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True if either delta affects the read
    pub fn affects_either(
        &self,
        added: &Delta,
        removed: &Delta,
        op: &EvaluateOperation,
    ) -> StoreResult<bool> {
        Ok(self.affects(added, op)? || self.affects(removed, op)?)
    }
}
