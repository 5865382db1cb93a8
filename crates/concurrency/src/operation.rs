//! Evaluate-Operation: one recorded read
//!
//! An operation captures everything that determines a read's result besides
//! the store contents: the plan, the dataset, the input bindings and whether
//! inferred quads participate. Equality is structural over all four, so a
//! read-set of operations collapses repeated identical reads.
//!
//! The content hash is computed once at construction; operations are hashed
//! many times during a prepare scan.

use optimist_core::{
    BindingSet, Dataset, QuadPattern, Scope, StatementPattern, Term, TupleExpr, Var,
};
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Binding names used for pattern reads
const SUBJECT: &str = "subj";
const PREDICATE: &str = "pred";
const OBJECT: &str = "obj";
const CONTEXT: &str = "ctx";

/// An immutable record of one observed read
#[derive(Debug, Clone)]
pub struct EvaluateOperation {
    inner: Arc<OperationInner>,
    hash: u64,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct OperationInner {
    plan: TupleExpr,
    dataset: Option<Dataset>,
    bindings: BindingSet,
    include_inferred: bool,
}

impl EvaluateOperation {
    /// Record a plan evaluation
    pub fn new(
        plan: TupleExpr,
        dataset: Option<Dataset>,
        bindings: BindingSet,
        include_inferred: bool,
    ) -> Self {
        let inner = OperationInner {
            plan,
            dataset,
            bindings,
            include_inferred,
        };
        let mut hasher = FxHasher::default();
        inner.hash(&mut hasher);
        Self {
            inner: Arc::new(inner),
            hash: hasher.finish(),
        }
    }

    /// Record a quad pattern read
    ///
    /// The pattern becomes a union of statement patterns, one per requested
    /// context. Reads of the default graph or of all contexts use the default
    /// scope; reads of a named graph use the named scope.
    pub fn read(pattern: &QuadPattern, include_inferred: bool) -> Self {
        let position = |name: &str, value: &Option<Term>| Var::bound(name, value.clone());
        let leaf = |context: Option<Var>, scope: Scope| {
            TupleExpr::StatementPattern(StatementPattern {
                scope,
                subject: position(SUBJECT, &pattern.subject),
                predicate: position(PREDICATE, &pattern.predicate),
                object: position(OBJECT, &pattern.object),
                context,
            })
        };

        let plan = if pattern.contexts.is_empty() {
            leaf(None, Scope::DefaultContexts)
        } else {
            pattern
                .contexts
                .iter()
                .map(|ctx| match ctx {
                    None => leaf(Some(Var::new(CONTEXT)), Scope::DefaultContexts),
                    Some(term) => leaf(
                        Some(Var::bound(CONTEXT, Some(term.clone()))),
                        Scope::NamedContexts,
                    ),
                })
                .reduce(TupleExpr::union)
                .unwrap_or(TupleExpr::EmptySet)
        };
        Self::new(plan, None, BindingSet::new(), include_inferred)
    }

    /// The recorded plan
    pub fn plan(&self) -> &TupleExpr {
        &self.inner.plan
    }

    /// The recorded dataset
    pub fn dataset(&self) -> Option<&Dataset> {
        self.inner.dataset.as_ref()
    }

    /// The recorded input bindings
    pub fn bindings(&self) -> &BindingSet {
        &self.inner.bindings
    }

    /// Whether inferred quads participated
    pub fn include_inferred(&self) -> bool {
        self.inner.include_inferred
    }

    /// Content hash over all four fields
    pub fn content_hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for EvaluateOperation {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && (Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner)
    }
}

impl Eq for EvaluateOperation {}

impl Hash for EvaluateOperation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for EvaluateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.plan)?;
        if !self.inner.bindings.is_empty() {
            write!(f, " with {}", self.inner.bindings)?;
        }
        Ok(())
    }
}
