//! Query-Delta Merger
//!
//! Rewrites a plan so that evaluating it against the backend reflects a set
//! of quads as additionally present (`added`) or additionally absent
//! (`removed`). Every statement pattern leaf that a delta quad could match is
//! replaced:
//!
//! ```text
//! sp                       no matching delta quads
//! Difference(sp', R)       removed quads R match
//! Union(A, sp)             added quads A match
//! Union(A, Difference(sp', R))
//! ```
//!
//! `sp'` carries a context variable so removal compares graphs too. Injected
//! added quads bind the merger's additional bindings, which is how the
//! conflict oracle marks rows that only exist because of the delta.
//!
//! The input plan is never mutated; the merger folds it into a new tree.

use crate::delta::Delta;
use optimist_core::pattern::filter_quads;
use optimist_core::{
    BindingSet, Dataset, ExternalQuads, PlanFolder, Quad, StatementPattern, TupleExpr, Var,
};

/// Prefix of generated context variables
const GRAPH_VAR_PREFIX: &str = "-delta-merger-graph-";

/// Plan rewriter injecting a delta into statement pattern leaves
pub struct DeltaMerger<'a> {
    added: &'a Delta,
    removed: Option<&'a Delta>,
    additional: BindingSet,
    dataset: Option<&'a Dataset>,
    bindings: &'a BindingSet,
    modified: bool,
    graph_vars: usize,
}

impl<'a> DeltaMerger<'a> {
    /// Merger showing `added` as present and `removed` as absent
    pub fn new(
        added: &'a Delta,
        removed: &'a Delta,
        dataset: Option<&'a Dataset>,
        bindings: &'a BindingSet,
    ) -> Self {
        Self {
            added,
            removed: Some(removed),
            additional: BindingSet::new(),
            dataset,
            bindings,
            modified: false,
            graph_vars: 0,
        }
    }

    /// Merger injecting `delta` as present, binding `marker` on every row an
    /// injected quad produces
    pub fn with_marker(
        delta: &'a Delta,
        marker: BindingSet,
        dataset: Option<&'a Dataset>,
        bindings: &'a BindingSet,
    ) -> Self {
        Self {
            added: delta,
            removed: None,
            additional: marker,
            dataset,
            bindings,
            modified: false,
            graph_vars: 0,
        }
    }

    /// Rewrite `plan`
    pub fn merge(&mut self, plan: &TupleExpr) -> TupleExpr {
        self.fold(plan)
    }

    /// True if any leaf was rewritten
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn external(&self, sp: &StatementPattern, quads: Vec<Quad>, additional: BindingSet) -> TupleExpr {
        TupleExpr::External(ExternalQuads {
            pattern: sp.clone(),
            dataset: self.dataset.cloned(),
            quads,
            additional,
        })
    }
}

impl PlanFolder for DeltaMerger<'_> {
    fn fold_statement_pattern(&mut self, sp: &StatementPattern) -> TupleExpr {
        let minus = match self.removed {
            Some(removed) if !removed.is_empty() => {
                filter_quads(removed.iter(), sp, self.dataset, self.bindings)
            }
            _ => Vec::new(),
        };
        let union = if self.added.is_empty() {
            Vec::new()
        } else {
            filter_quads(self.added.iter(), sp, self.dataset, self.bindings)
        };

        let mut sp = sp.clone();
        let mut node = if minus.is_empty() {
            TupleExpr::StatementPattern(sp.clone())
        } else {
            self.modified = true;
            if sp.context.is_none() {
                self.graph_vars += 1;
                sp.context = Some(Var::anonymous(format!(
                    "{}{}",
                    GRAPH_VAR_PREFIX, self.graph_vars
                )));
            }
            TupleExpr::difference(
                TupleExpr::StatementPattern(sp.clone()),
                self.external(&sp, minus, BindingSet::new()),
            )
        };

        if !union.is_empty() {
            self.modified = true;
            let injected = self.external(&sp, union, self.additional.clone());
            node = TupleExpr::union(injected, node);
        }
        node
    }
}
