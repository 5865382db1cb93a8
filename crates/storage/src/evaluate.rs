//! Plan evaluation over an in-memory quad source
//!
//! Straightforward nested-loop evaluation. Joins pass each left row as the
//! input bindings of the right side, so statement patterns on the right are
//! looked up with the left row's values already fixed.

use optimist_core::pattern;
use optimist_core::{BindingSet, Dataset, Quad, QuadPattern, StatementPattern, TupleExpr};
use rustc_hash::FxHashSet;

/// Anything that can answer quad pattern lookups
pub trait QuadSource {
    /// Quads matching the pattern
    fn matching(&self, pattern: &QuadPattern) -> Vec<Quad>;
}

/// Evaluates plans against a [`QuadSource`]
pub struct Evaluator<'a, S: QuadSource + ?Sized> {
    source: &'a S,
    dataset: Option<&'a Dataset>,
}

impl<'a, S: QuadSource + ?Sized> Evaluator<'a, S> {
    /// Evaluator over `source`, restricted to `dataset` when given
    pub fn new(source: &'a S, dataset: Option<&'a Dataset>) -> Self {
        Self { source, dataset }
    }

    /// Solution rows as callers see them: [`evaluate`](Self::evaluate) with
    /// the bindings of anonymous variables dropped
    pub fn solutions(&self, expr: &TupleExpr, bindings: &BindingSet) -> Vec<BindingSet> {
        let hidden = anonymous_names(expr);
        let mut rows = self.evaluate(expr, bindings);
        if !hidden.is_empty() {
            for row in &mut rows {
                for name in &hidden {
                    row.remove(name);
                }
            }
        }
        rows
    }

    /// All solution rows of `expr` extending `bindings`
    ///
    /// Anonymous variables stay bound so rows compare exactly inside
    /// differences.
    pub fn evaluate(&self, expr: &TupleExpr, bindings: &BindingSet) -> Vec<BindingSet> {
        match expr {
            TupleExpr::StatementPattern(sp) => self.statement_pattern(sp, bindings),
            TupleExpr::Join(left, right) => self
                .evaluate(left, bindings)
                .iter()
                .flat_map(|row| self.evaluate(right, row))
                .collect(),
            TupleExpr::LeftJoin {
                left,
                right,
                condition,
            } => {
                let mut rows = Vec::new();
                for row in self.evaluate(left, bindings) {
                    let joined: Vec<BindingSet> = self
                        .evaluate(right, &row)
                        .into_iter()
                        .filter(|r| condition.as_ref().map_or(true, |c| c.is_true(r)))
                        .collect();
                    if joined.is_empty() {
                        rows.push(row);
                    } else {
                        rows.extend(joined);
                    }
                }
                rows
            }
            TupleExpr::Union(left, right) => {
                let mut rows = self.evaluate(left, bindings);
                rows.extend(self.evaluate(right, bindings));
                rows
            }
            TupleExpr::Difference(left, right) => {
                let excluded: FxHashSet<BindingSet> =
                    self.evaluate(right, bindings).into_iter().collect();
                self.evaluate(left, bindings)
                    .into_iter()
                    .filter(|row| !excluded.contains(row))
                    .collect()
            }
            TupleExpr::Filter { arg, condition } => self
                .evaluate(arg, bindings)
                .into_iter()
                .filter(|row| condition.is_true(row))
                .collect(),
            TupleExpr::Extension { arg, elements } => self
                .evaluate(arg, bindings)
                .into_iter()
                .map(|mut row| {
                    for elem in elements {
                        if let Some(value) = elem.expr.evaluate(&row) {
                            row.insert(elem.name.clone(), value);
                        }
                    }
                    row
                })
                .collect(),
            TupleExpr::Projection { arg, names } => self
                .evaluate(arg, bindings)
                .iter()
                .map(|row| row.project(names))
                .collect(),
            TupleExpr::Distinct(arg) => {
                let mut seen = FxHashSet::default();
                self.evaluate(arg, bindings)
                    .into_iter()
                    .filter(|row| seen.insert(row.clone()))
                    .collect()
            }
            TupleExpr::Slice { arg, offset, limit } => self
                .evaluate(arg, bindings)
                .into_iter()
                .skip(*offset)
                .take(limit.unwrap_or(usize::MAX))
                .collect(),
            TupleExpr::Values(rows) => rows
                .iter()
                .filter(|row| row.is_compatible(bindings))
                .map(|row| bindings.merged(row))
                .collect(),
            TupleExpr::SingletonSet => vec![bindings.clone()],
            TupleExpr::EmptySet => Vec::new(),
            TupleExpr::External(external) => external.evaluate(bindings),
        }
    }

    fn statement_pattern(&self, sp: &StatementPattern, bindings: &BindingSet) -> Vec<BindingSet> {
        let Some(contexts) = pattern::resolve_contexts(sp, self.dataset, bindings) else {
            return Vec::new();
        };
        let lookup = pattern::quad_pattern(sp, bindings, contexts);
        self.source
            .matching(&lookup)
            .iter()
            .filter_map(|quad| pattern::match_quad(sp, quad, bindings))
            .collect()
    }
}

/// Names of anonymous variables (constants, generated graph variables)
/// anywhere in the plan
fn anonymous_names(expr: &TupleExpr) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    expr.walk(&mut |node| {
        let sp = match node {
            TupleExpr::StatementPattern(sp) => sp,
            TupleExpr::External(external) => &external.pattern,
            _ => return,
        };
        names.extend(sp.vars().filter(|var| var.anonymous).map(|var| var.name.clone()));
    });
    names
}

impl QuadSource for [Quad] {
    fn matching(&self, pattern: &QuadPattern) -> Vec<Quad> {
        self.iter().filter(|q| pattern.matches(q)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimist_core::{CompareOp, ExternalQuads, Term, ValueExpr, Var};

    fn q(s: &str, p: &str, o: &str) -> Quad {
        Quad::new(Term::iri(s), Term::iri(p), Term::iri(o))
    }

    fn sp(s: &str, p: &str, o: &str) -> StatementPattern {
        StatementPattern::new(Var::new(s), Var::constant(Term::iri(p)), Var::new(o))
    }

    fn data() -> Vec<Quad> {
        vec![
            q("urn:alice", "urn:knows", "urn:bob"),
            q("urn:bob", "urn:knows", "urn:carol"),
            q("urn:alice", "urn:name", "urn:n-alice"),
        ]
    }

    fn eval(expr: &TupleExpr) -> Vec<BindingSet> {
        let quads = data();
        Evaluator::new(quads.as_slice(), None).evaluate(expr, &BindingSet::new())
    }

    #[test]
    fn test_join_passes_bindings() {
        let plan = TupleExpr::join(
            TupleExpr::pattern(sp("a", "urn:knows", "b")),
            TupleExpr::pattern(sp("b", "urn:knows", "c")),
        );
        let rows = eval(&plan);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("c"), Some(&Term::iri("urn:carol")));
    }

    #[test]
    fn test_left_join_keeps_unmatched() {
        let plan = TupleExpr::left_join(
            TupleExpr::pattern(sp("a", "urn:knows", "b")),
            TupleExpr::pattern(sp("a", "urn:name", "n")),
            None,
        );
        let rows = eval(&plan);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.contains("n")).count(), 1);
    }

    #[test]
    fn test_difference_removes_matching_rows() {
        let plan = TupleExpr::difference(
            TupleExpr::pattern(sp("a", "urn:knows", "b")),
            TupleExpr::External(ExternalQuads {
                pattern: sp("a", "urn:knows", "b"),
                dataset: None,
                quads: vec![q("urn:alice", "urn:knows", "urn:bob")],
                additional: BindingSet::new(),
            }),
        );
        let rows = eval(&plan);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("a"), Some(&Term::iri("urn:bob")));
    }

    #[test]
    fn test_filter_projection_distinct_slice() {
        let plan = TupleExpr::Slice {
            arg: Box::new(TupleExpr::Distinct(Box::new(TupleExpr::projection(
                TupleExpr::filter(
                    TupleExpr::pattern(sp("a", "urn:knows", "b")),
                    ValueExpr::compare(
                        CompareOp::Ne,
                        ValueExpr::Var("b".into()),
                        ValueExpr::Constant(Term::iri("urn:carol")),
                    ),
                ),
                &["a"],
            )))),
            offset: 0,
            limit: Some(5),
        };
        let rows = eval(&plan);
        assert_eq!(rows, vec![BindingSet::with("a", Term::iri("urn:alice"))]);
    }

    #[test]
    fn test_values_respect_input_bindings() {
        let plan = TupleExpr::Values(vec![
            BindingSet::with("x", Term::literal("1")),
            BindingSet::with("x", Term::literal("2")),
        ]);
        let quads = data();
        let input = BindingSet::with("x", Term::literal("2"));
        let rows = Evaluator::new(quads.as_slice(), None).evaluate(&plan, &input);
        assert_eq!(rows, vec![input]);
    }

    #[test]
    fn test_solutions_hide_anonymous_bindings() {
        let pattern = sp("a", "urn:knows", "b");
        let plan = TupleExpr::pattern(pattern.clone());
        let quads = data();
        let evaluator = Evaluator::new(quads.as_slice(), None);

        let internal = evaluator.evaluate(&plan, &BindingSet::new());
        assert!(internal.iter().all(|row| row.contains(&pattern.predicate.name)));

        let rows = evaluator.solutions(&plan, &BindingSet::new());
        assert_eq!(rows.len(), 2);
        for row in &rows {
            let mut names: Vec<&str> = row.names().collect();
            names.sort_unstable();
            assert_eq!(names, vec!["a", "b"]);
        }
    }
}
