//! Exclusion analysis: which parts of a plan to record as reads
//!
//! A node is *basic* when adding quads to the store can only add rows to its
//! result and every row keeps all bindings of its inputs. Evaluating a basic
//! subtree with a delta injected therefore shows injected rows in the output,
//! which is what the conflict oracle looks for.
//!
//! A node *excludes* when it, or anything below it, is not basic:
//! projections, distinct, slices, left joins with a condition, differences
//! against anything but an enumerated quad set, and filters in a tree that
//! contains a left join (`!bound` over an optional).
//!
//! Reads are recorded as the maximal basic subtrees of the plan.

use optimist_core::TupleExpr;

/// True if the tree rooted at `expr` contains a non-basic node
pub fn is_excluding(expr: &TupleExpr) -> bool {
    let left_join_present = expr.any(&|node| matches!(node, TupleExpr::LeftJoin { .. }));
    excludes(expr, left_join_present)
}

fn excludes(expr: &TupleExpr, left_join_present: bool) -> bool {
    let basic = match expr {
        TupleExpr::StatementPattern(_)
        | TupleExpr::Join(..)
        | TupleExpr::Union(..)
        | TupleExpr::Extension { .. }
        | TupleExpr::Values(_)
        | TupleExpr::SingletonSet
        | TupleExpr::EmptySet
        | TupleExpr::External(_) => true,
        TupleExpr::Difference(_, right) => matches!(**right, TupleExpr::External(_)),
        TupleExpr::LeftJoin { condition, .. } => condition.is_none(),
        TupleExpr::Filter { .. } => !left_join_present,
        TupleExpr::Projection { .. } | TupleExpr::Distinct(_) | TupleExpr::Slice { .. } => false,
    };
    !basic
        || expr
            .children()
            .into_iter()
            .any(|child| excludes(child, left_join_present))
}

/// Maximal basic subtrees of `plan`
///
/// A plan without exclusion is returned whole. Otherwise every subtree that
/// is itself basic but whose parent excludes is returned, left to right.
pub fn basic_nodes(plan: &TupleExpr) -> Vec<TupleExpr> {
    if !is_excluding(plan) {
        return vec![plan.clone()];
    }
    let mut nodes = Vec::new();
    collect(plan, &mut nodes);
    nodes
}

fn collect(parent: &TupleExpr, nodes: &mut Vec<TupleExpr>) {
    for child in parent.children() {
        if is_excluding(child) {
            collect(child, nodes);
        } else {
            nodes.push(child.clone());
        }
    }
}
