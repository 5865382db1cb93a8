//! Statement pattern matching
//!
//! Shared by backend evaluators and by code that evaluates patterns over an
//! in-memory list of quads, so both agree on how a pattern, a dataset and
//! input bindings select quads.

use crate::algebra::{Scope, StatementPattern};
use crate::bindings::{BindingSet, Dataset};
use crate::types::{Quad, QuadPattern, Term};

/// Contexts a statement pattern reads, given a dataset and input bindings
///
/// Returns `None` when the pattern can match nothing (the scoped graph set is
/// empty while the dataset names other graphs, or a bound context lies
/// outside the dataset). `Some(vec![])` means all contexts.
pub fn resolve_contexts(
    sp: &StatementPattern,
    dataset: Option<&Dataset>,
    bindings: &BindingSet,
) -> Option<Vec<Option<Term>>> {
    let ctx_value = sp.context.as_ref().and_then(|v| v.value_in(bindings));
    let unrestricted = || match ctx_value {
        Some(ctx) => vec![Some(ctx.clone())],
        None => Vec::new(),
    };

    let Some(dataset) = dataset else {
        return Some(unrestricted());
    };
    let (graphs, other) = match sp.scope {
        Scope::DefaultContexts => (&dataset.default_graphs, &dataset.named_graphs),
        Scope::NamedContexts => (&dataset.named_graphs, &dataset.default_graphs),
    };

    if graphs.is_empty() {
        if other.is_empty() {
            Some(unrestricted())
        } else {
            None
        }
    } else if let Some(ctx) = ctx_value {
        graphs.contains(ctx).then(|| vec![Some(ctx.clone())])
    } else {
        Some(graphs.iter().map(|g| Some(g.clone())).collect())
    }
}

/// Backend lookup pattern for a statement pattern over resolved contexts
pub fn quad_pattern(
    sp: &StatementPattern,
    bindings: &BindingSet,
    contexts: Vec<Option<Term>>,
) -> QuadPattern {
    QuadPattern {
        subject: sp.subject.value_in(bindings).cloned(),
        predicate: sp.predicate.value_in(bindings).cloned(),
        object: sp.object.value_in(bindings).cloned(),
        contexts,
    }
}

/// Bind a candidate quad through the pattern
///
/// Extends `bindings` with every pattern position, constants included.
/// Returns `None` if a position disagrees with a fixed or already bound
/// value (this also enforces equality for a variable repeated inside the
/// pattern) or if a named-scope pattern meets a default-graph quad.
pub fn match_quad(sp: &StatementPattern, quad: &Quad, bindings: &BindingSet) -> Option<BindingSet> {
    if sp.scope == Scope::NamedContexts && quad.context.is_none() {
        return None;
    }
    let mut row = bindings.clone();
    let positions = [
        (&sp.subject, Some(&quad.subject)),
        (&sp.predicate, Some(&quad.predicate)),
        (&sp.object, Some(&quad.object)),
    ];
    let context = sp.context.as_ref().map(|var| (var, quad.context.as_ref()));

    for (var, term) in positions.into_iter().chain(context) {
        if let Some(fixed) = &var.value {
            if Some(fixed) != term {
                return None;
            }
        }
        match (row.get(&var.name), term) {
            (Some(bound), Some(term)) if bound != term => return None,
            (Some(_), None) => return None,
            (None, Some(term)) => row.insert(var.name.clone(), term.clone()),
            _ => {}
        }
    }
    Some(row)
}

/// Quads from `quads` the pattern selects under the dataset and bindings
pub fn filter_quads<'a>(
    quads: impl Iterator<Item = &'a Quad>,
    sp: &StatementPattern,
    dataset: Option<&Dataset>,
    bindings: &BindingSet,
) -> Vec<Quad> {
    let Some(contexts) = resolve_contexts(sp, dataset, bindings) else {
        return Vec::new();
    };
    let lookup = quad_pattern(sp, bindings, contexts);
    quads
        .filter(|quad| lookup.matches(quad))
        .filter(|quad| match_quad(sp, quad, bindings).is_some())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Var;

    fn q(s: &str, o: &str, ctx: Option<&str>) -> Quad {
        Quad {
            subject: Term::iri(s),
            predicate: Term::iri("urn:p"),
            object: Term::iri(o),
            context: ctx.map(Term::iri),
        }
    }

    fn triple_pattern() -> StatementPattern {
        StatementPattern::new(
            Var::new("s"),
            Var::constant(Term::iri("urn:p")),
            Var::new("o"),
        )
    }

    #[test]
    fn test_no_dataset_reads_everything() {
        let sp = triple_pattern();
        let contexts = resolve_contexts(&sp, None, &BindingSet::new());
        assert_eq!(contexts, Some(vec![]));
    }

    #[test]
    fn test_empty_scoped_graphs_match_nothing() {
        let sp = triple_pattern();
        let dataset = Dataset::new().with_named_graph(Term::iri("urn:g"));
        assert_eq!(resolve_contexts(&sp, Some(&dataset), &BindingSet::new()), None);
    }

    #[test]
    fn test_bound_context_outside_dataset() {
        let sp = StatementPattern::in_graph(
            Var::new("s"),
            Var::new("p"),
            Var::new("o"),
            Var::new("g"),
        );
        let dataset = Dataset::new().with_named_graph(Term::iri("urn:g1"));
        let inside = BindingSet::with("g", Term::iri("urn:g1"));
        let outside = BindingSet::with("g", Term::iri("urn:g2"));
        assert_eq!(
            resolve_contexts(&sp, Some(&dataset), &inside),
            Some(vec![Some(Term::iri("urn:g1"))])
        );
        assert_eq!(resolve_contexts(&sp, Some(&dataset), &outside), None);
        assert_eq!(
            resolve_contexts(&sp, Some(&dataset), &BindingSet::new()).map(|c| c.len()),
            Some(1)
        );
    }

    #[test]
    fn test_repeated_variable_must_agree() {
        let sp = StatementPattern::new(Var::new("x"), Var::constant(Term::iri("urn:p")), Var::new("x"));
        assert!(match_quad(&sp, &q("urn:a", "urn:a", None), &BindingSet::new()).is_some());
        assert!(match_quad(&sp, &q("urn:a", "urn:b", None), &BindingSet::new()).is_none());
    }

    #[test]
    fn test_named_scope_skips_default_graph() {
        let sp = StatementPattern::in_graph(
            Var::new("s"),
            Var::new("p"),
            Var::new("o"),
            Var::new("g"),
        );
        assert!(match_quad(&sp, &q("urn:a", "urn:b", None), &BindingSet::new()).is_none());
        let row = match_quad(&sp, &q("urn:a", "urn:b", Some("urn:g")), &BindingSet::new()).unwrap();
        assert_eq!(row.get("g"), Some(&Term::iri("urn:g")));
    }

    #[test]
    fn test_filter_honours_bindings() {
        let quads = vec![q("urn:a", "urn:x", None), q("urn:b", "urn:y", None)];
        let bindings = BindingSet::with("s", Term::iri("urn:b"));
        let selected = filter_quads(quads.iter(), &triple_pattern(), None, &bindings);
        assert_eq!(selected, vec![q("urn:b", "urn:y", None)]);
    }
}
