//! Query-plan algebra
//!
//! Plans are immutable trees of [`TupleExpr`] nodes. Rewrites never mutate a
//! plan in place: a [`PlanFolder`] walks the tree and builds a new one, which
//! lets a recorded read keep its plan while rewritten copies are evaluated.
//!
//! All node types derive structural `Eq` and `Hash`, so two plans compare
//! equal only if their trees are identical. Logically equivalent plans with
//! different shapes stay distinct.

use crate::bindings::{BindingSet, Dataset};
use crate::pattern;
use crate::types::{Quad, Term};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Which graphs a statement pattern reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// The default graph (or the dataset's default graphs)
    DefaultContexts,
    /// Named graphs only (`GRAPH` patterns)
    NamedContexts,
}

/// A pattern position: a named variable, possibly fixed to a constant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var {
    /// Binding name
    pub name: String,
    /// Fixed value, if this position is a constant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Term>,
    /// Generated name, not user visible
    #[serde(default)]
    pub anonymous: bool,
}

impl Var {
    /// Free variable
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            anonymous: false,
        }
    }

    /// Constant position; the name is derived from the value so equal
    /// constants share a binding name
    pub fn constant(value: Term) -> Self {
        Self {
            name: format!("-const-{}", value),
            value: Some(value),
            anonymous: true,
        }
    }

    /// Generated variable with the given name
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            anonymous: true,
        }
    }

    /// Named variable with a fixed value
    pub fn bound(name: impl Into<String>, value: Option<Term>) -> Self {
        Self {
            name: name.into(),
            value,
            anonymous: false,
        }
    }

    /// Fixed value, or the value bound to this name in `bindings`
    pub fn value_in<'a>(&'a self, bindings: &'a BindingSet) -> Option<&'a Term> {
        self.value.as_ref().or_else(|| bindings.get(&self.name))
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "?{}", self.name),
        }
    }
}

/// A single triple/quad pattern leaf
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementPattern {
    /// Graph scope
    pub scope: Scope,
    /// Subject position
    pub subject: Var,
    /// Predicate position
    pub predicate: Var,
    /// Object position
    pub object: Var,
    /// Context position, absent for plain triple patterns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Var>,
}

impl StatementPattern {
    /// Default-scope triple pattern
    pub fn new(subject: Var, predicate: Var, object: Var) -> Self {
        Self {
            scope: Scope::DefaultContexts,
            subject,
            predicate,
            object,
            context: None,
        }
    }

    /// Named-scope pattern with a context variable
    pub fn in_graph(subject: Var, predicate: Var, object: Var, context: Var) -> Self {
        Self {
            scope: Scope::NamedContexts,
            subject,
            predicate,
            object,
            context: Some(context),
        }
    }

    /// Positions in subject, predicate, object, context order
    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .chain(self.context.as_ref())
    }
}

impl fmt::Display for StatementPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(ctx) = &self.context {
            write!(f, " {}", ctx)?;
        }
        write!(f, ")")
    }
}

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Scalar expressions used by filters, left-join conditions and extensions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueExpr {
    /// Value bound to a variable
    Var(String),
    /// Constant term
    Constant(Term),
    /// `bound(?x)`
    Bound(String),
    /// Logical negation
    Not(Box<ValueExpr>),
    /// Logical conjunction
    And(Box<ValueExpr>, Box<ValueExpr>),
    /// Logical disjunction
    Or(Box<ValueExpr>, Box<ValueExpr>),
    /// Value comparison
    Compare {
        /// Operator
        op: CompareOp,
        /// Left operand
        left: Box<ValueExpr>,
        /// Right operand
        right: Box<ValueExpr>,
    },
    /// Term identity
    SameTerm(Box<ValueExpr>, Box<ValueExpr>),
}

impl ValueExpr {
    /// Comparison helper
    pub fn compare(op: CompareOp, left: ValueExpr, right: ValueExpr) -> Self {
        ValueExpr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluate against a row; `None` is an evaluation error
    pub fn evaluate(&self, row: &BindingSet) -> Option<Term> {
        match self {
            ValueExpr::Var(name) => row.get(name).cloned(),
            ValueExpr::Constant(term) => Some(term.clone()),
            ValueExpr::Bound(name) => Some(Term::boolean(row.contains(name))),
            ValueExpr::Not(arg) => arg.boolean(row).map(|b| Term::boolean(!b)),
            ValueExpr::And(l, r) => match (l.boolean(row), r.boolean(row)) {
                (Some(false), _) | (_, Some(false)) => Some(Term::boolean(false)),
                (Some(true), Some(true)) => Some(Term::boolean(true)),
                _ => None,
            },
            ValueExpr::Or(l, r) => match (l.boolean(row), r.boolean(row)) {
                (Some(true), _) | (_, Some(true)) => Some(Term::boolean(true)),
                (Some(false), Some(false)) => Some(Term::boolean(false)),
                _ => None,
            },
            ValueExpr::Compare { op, left, right } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                compare_terms(*op, &l, &r).map(Term::boolean)
            }
            ValueExpr::SameTerm(l, r) => Some(Term::boolean(l.evaluate(row)? == r.evaluate(row)?)),
        }
    }

    /// Effective boolean value; `None` is an evaluation error
    pub fn boolean(&self, row: &BindingSet) -> Option<bool> {
        effective_boolean(&self.evaluate(row)?)
    }

    /// Filter semantics: errors count as false
    pub fn is_true(&self, row: &BindingSet) -> bool {
        self.boolean(row).unwrap_or(false)
    }
}

fn effective_boolean(term: &Term) -> Option<bool> {
    let lit = term.as_literal()?;
    if let Some(b) = lit.as_bool() {
        return Some(b);
    }
    if let Some(n) = lit.as_f64() {
        return Some(n != 0.0 && !n.is_nan());
    }
    if lit.datatype == crate::types::XSD_STRING || lit.language.is_some() {
        return Some(!lit.value.is_empty());
    }
    None
}

fn compare_terms(op: CompareOp, left: &Term, right: &Term) -> Option<bool> {
    let ordering = match (left.as_literal(), right.as_literal()) {
        (Some(l), Some(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ if l.datatype == r.datatype && l.language == r.language => {
                Some(l.value.cmp(&r.value))
            }
            _ => None,
        },
        _ => None,
    };
    match (op, ordering) {
        (CompareOp::Eq, Some(ord)) => Some(ord == Ordering::Equal),
        (CompareOp::Ne, Some(ord)) => Some(ord != Ordering::Equal),
        (CompareOp::Eq, None) => Some(left == right),
        (CompareOp::Ne, None) => Some(left != right),
        (CompareOp::Lt, Some(ord)) => Some(ord == Ordering::Less),
        (CompareOp::Le, Some(ord)) => Some(ord != Ordering::Greater),
        (CompareOp::Gt, Some(ord)) => Some(ord == Ordering::Greater),
        (CompareOp::Ge, Some(ord)) => Some(ord != Ordering::Less),
        (_, None) => None,
    }
}

/// `BIND(expr AS ?name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionElem {
    /// Bound name
    pub name: String,
    /// Value expression
    pub expr: ValueExpr,
}

/// An explicit enumeration of quads, evaluated as if it were a statement
/// pattern over just these quads
///
/// `additional` is merged into every produced row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalQuads {
    /// Pattern the quads are bound through
    pub pattern: StatementPattern,
    /// Dataset that restricts contexts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Dataset>,
    /// Enumerated quads
    pub quads: Vec<Quad>,
    /// Extra bindings added to every row
    #[serde(default)]
    pub additional: BindingSet,
}

impl ExternalQuads {
    /// Rows produced for the given input bindings
    pub fn evaluate(&self, bindings: &BindingSet) -> Vec<BindingSet> {
        pattern::filter_quads(
            self.quads.iter(),
            &self.pattern,
            self.dataset.as_ref(),
            bindings,
        )
        .iter()
        .filter_map(|quad| pattern::match_quad(&self.pattern, quad, bindings))
        .map(|row| row.merged(&self.additional))
        .collect()
    }
}

/// A query plan node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TupleExpr {
    /// Quad pattern leaf
    StatementPattern(StatementPattern),
    /// Inner join
    Join(Box<TupleExpr>, Box<TupleExpr>),
    /// Optional join with an optional condition
    LeftJoin {
        /// Required side
        left: Box<TupleExpr>,
        /// Optional side
        right: Box<TupleExpr>,
        /// Join condition
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<ValueExpr>,
    },
    /// Bag union
    Union(Box<TupleExpr>, Box<TupleExpr>),
    /// Rows of the left side that do not occur on the right side
    Difference(Box<TupleExpr>, Box<TupleExpr>),
    /// Rows satisfying a condition
    Filter {
        /// Input
        arg: Box<TupleExpr>,
        /// Condition
        condition: ValueExpr,
    },
    /// Computed bindings
    Extension {
        /// Input
        arg: Box<TupleExpr>,
        /// Bound expressions
        elements: Vec<ExtensionElem>,
    },
    /// Keep only the listed names
    Projection {
        /// Input
        arg: Box<TupleExpr>,
        /// Projected names
        names: Vec<String>,
    },
    /// Drop duplicate rows
    Distinct(Box<TupleExpr>),
    /// Offset and limit
    Slice {
        /// Input
        arg: Box<TupleExpr>,
        /// Rows skipped
        offset: usize,
        /// Maximum rows returned
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    /// Inline rows (`VALUES`)
    Values(Vec<BindingSet>),
    /// A single empty row
    SingletonSet,
    /// No rows
    EmptySet,
    /// Enumerated quads
    External(ExternalQuads),
}

impl TupleExpr {
    /// Leaf for a statement pattern
    pub fn pattern(sp: StatementPattern) -> Self {
        TupleExpr::StatementPattern(sp)
    }

    /// Inner join
    pub fn join(left: TupleExpr, right: TupleExpr) -> Self {
        TupleExpr::Join(Box::new(left), Box::new(right))
    }

    /// Left join
    pub fn left_join(left: TupleExpr, right: TupleExpr, condition: Option<ValueExpr>) -> Self {
        TupleExpr::LeftJoin {
            left: Box::new(left),
            right: Box::new(right),
            condition,
        }
    }

    /// Union
    pub fn union(left: TupleExpr, right: TupleExpr) -> Self {
        TupleExpr::Union(Box::new(left), Box::new(right))
    }

    /// Difference
    pub fn difference(left: TupleExpr, right: TupleExpr) -> Self {
        TupleExpr::Difference(Box::new(left), Box::new(right))
    }

    /// Filter
    pub fn filter(arg: TupleExpr, condition: ValueExpr) -> Self {
        TupleExpr::Filter {
            arg: Box::new(arg),
            condition,
        }
    }

    /// Projection
    pub fn projection(arg: TupleExpr, names: &[&str]) -> Self {
        TupleExpr::Projection {
            arg: Box::new(arg),
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Direct children, left to right
    pub fn children(&self) -> Vec<&TupleExpr> {
        match self {
            TupleExpr::Join(l, r) | TupleExpr::Union(l, r) | TupleExpr::Difference(l, r) => {
                vec![l.as_ref(), r.as_ref()]
            }
            TupleExpr::LeftJoin { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            TupleExpr::Filter { arg, .. }
            | TupleExpr::Extension { arg, .. }
            | TupleExpr::Projection { arg, .. }
            | TupleExpr::Slice { arg, .. }
            | TupleExpr::Distinct(arg) => vec![arg.as_ref()],
            TupleExpr::StatementPattern(_)
            | TupleExpr::Values(_)
            | TupleExpr::SingletonSet
            | TupleExpr::EmptySet
            | TupleExpr::External(_) => Vec::new(),
        }
    }

    /// Pre-order walk over this node and all descendants
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TupleExpr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// True if any node in the tree satisfies `pred`
    pub fn any(&self, pred: &impl Fn(&TupleExpr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    /// All statement patterns in pre-order
    pub fn statement_patterns(&self) -> Vec<&StatementPattern> {
        let mut patterns = Vec::new();
        self.walk(&mut |node| {
            if let TupleExpr::StatementPattern(sp) = node {
                patterns.push(sp);
            }
        });
        patterns
    }
}

impl fmt::Display for TupleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleExpr::StatementPattern(sp) => write!(f, "{}", sp),
            TupleExpr::Join(l, r) => write!(f, "Join({}, {})", l, r),
            TupleExpr::LeftJoin {
                left,
                right,
                condition,
            } => match condition {
                Some(_) => write!(f, "LeftJoin({}, {}, ..)", left, right),
                None => write!(f, "LeftJoin({}, {})", left, right),
            },
            TupleExpr::Union(l, r) => write!(f, "Union({}, {})", l, r),
            TupleExpr::Difference(l, r) => write!(f, "Difference({}, {})", l, r),
            TupleExpr::Filter { arg, .. } => write!(f, "Filter({})", arg),
            TupleExpr::Extension { arg, elements } => {
                let names: Vec<&str> = elements.iter().map(|e| e.name.as_str()).collect();
                write!(f, "Extension({}, {})", arg, names.join(" "))
            }
            TupleExpr::Projection { arg, names } => {
                write!(f, "Projection({}, {})", arg, names.join(" "))
            }
            TupleExpr::Distinct(arg) => write!(f, "Distinct({})", arg),
            TupleExpr::Slice { arg, offset, limit } => match limit {
                Some(limit) => write!(f, "Slice({}, {}, {})", arg, offset, limit),
                None => write!(f, "Slice({}, {})", arg, offset),
            },
            TupleExpr::Values(rows) => write!(f, "Values({} rows)", rows.len()),
            TupleExpr::SingletonSet => write!(f, "SingletonSet"),
            TupleExpr::EmptySet => write!(f, "EmptySet"),
            TupleExpr::External(ext) => {
                write!(f, "External({}, {} quads)", ext.pattern, ext.quads.len())
            }
        }
    }
}

/// Bottom-up plan rewriting that builds a new tree
///
/// Implementors override the hooks they care about; the default methods
/// rebuild the node unchanged from rewritten children.
pub trait PlanFolder {
    /// Rewrite a statement pattern leaf
    fn fold_statement_pattern(&mut self, sp: &StatementPattern) -> TupleExpr {
        TupleExpr::StatementPattern(sp.clone())
    }

    /// Rewrite any node
    fn fold(&mut self, expr: &TupleExpr) -> TupleExpr {
        fold_children(self, expr)
    }
}

/// Rebuild `expr` with every child passed through `folder`
pub fn fold_children<F: PlanFolder + ?Sized>(folder: &mut F, expr: &TupleExpr) -> TupleExpr {
    fn sub<F: PlanFolder + ?Sized>(folder: &mut F, expr: &TupleExpr) -> Box<TupleExpr> {
        Box::new(folder.fold(expr))
    }

    match expr {
        TupleExpr::StatementPattern(sp) => folder.fold_statement_pattern(sp),
        TupleExpr::Join(l, r) => TupleExpr::Join(sub(folder, l), sub(folder, r)),
        TupleExpr::Union(l, r) => TupleExpr::Union(sub(folder, l), sub(folder, r)),
        TupleExpr::Difference(l, r) => TupleExpr::Difference(sub(folder, l), sub(folder, r)),
        TupleExpr::LeftJoin {
            left,
            right,
            condition,
        } => TupleExpr::LeftJoin {
            left: sub(folder, left),
            right: sub(folder, right),
            condition: condition.clone(),
        },
        TupleExpr::Filter { arg, condition } => TupleExpr::Filter {
            arg: sub(folder, arg),
            condition: condition.clone(),
        },
        TupleExpr::Extension { arg, elements } => TupleExpr::Extension {
            arg: sub(folder, arg),
            elements: elements.clone(),
        },
        TupleExpr::Projection { arg, names } => TupleExpr::Projection {
            arg: sub(folder, arg),
            names: names.clone(),
        },
        TupleExpr::Distinct(arg) => TupleExpr::Distinct(sub(folder, arg)),
        TupleExpr::Slice { arg, offset, limit } => TupleExpr::Slice {
            arg: sub(folder, arg),
            offset: *offset,
            limit: *limit,
        },
        TupleExpr::Values(_)
        | TupleExpr::SingletonSet
        | TupleExpr::EmptySet
        | TupleExpr::External(_) => expr.clone(),
    }
}
