//! Model-Based Property Tests
//!
//! Random add/remove sequences are applied through the database and to a
//! plain set. The store must always agree with the set, whether the
//! operations commit one by one or together, and rollback must leave the
//! store untouched.

use crate::common::*;
use optimist::{Database, Quad, QuadPattern, Term};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn universe(i: usize) -> Quad {
    quad(&format!("urn:s{}", i % 3), "urn:p", &format!("{}", i))
}

fn subject(i: usize) -> QuadPattern {
    QuadPattern::new(Some(Term::iri(format!("urn:s{}", i % 3))), None, None)
}

/// `true` adds `universe(i)`, `false` removes everything with its subject
fn apply_model(model: &mut BTreeSet<Quad>, add: bool, i: usize) {
    if add {
        model.insert(universe(i));
    } else {
        let pattern = subject(i);
        model.retain(|q| !pattern.matches(q));
    }
}

fn stored(db: &Database) -> BTreeSet<Quad> {
    db.statements(&QuadPattern::any(), true)
        .unwrap()
        .into_iter()
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_auto_commit_matches_model(ops in prop::collection::vec((any::<bool>(), 0usize..9), 0..30)) {
        let db = Database::open_in_memory().unwrap();
        let mut model = BTreeSet::new();
        for (add, i) in ops {
            if add {
                db.add(vec![universe(i)]).unwrap();
            } else {
                db.remove(&subject(i)).unwrap();
            }
            apply_model(&mut model, add, i);
        }
        prop_assert_eq!(stored(&db), model);
    }

    #[test]
    fn prop_single_transaction_matches_model(ops in prop::collection::vec((any::<bool>(), 0usize..9), 0..30)) {
        let db = Database::open_in_memory().unwrap();
        db.add((0..3).map(universe)).unwrap();
        let mut model: BTreeSet<Quad> = (0..3).map(universe).collect();

        let mut conn = db.connection().unwrap();
        conn.begin().unwrap();
        for (add, i) in ops {
            if add {
                if !conn.has_statement(&QuadPattern::exact(&universe(i)), true).unwrap() {
                    conn.add_statement(universe(i)).unwrap();
                }
            } else {
                conn.remove_statements(&subject(i)).unwrap();
            }
            apply_model(&mut model, add, i);
            prop_assert_eq!(conn.size(&QuadPattern::any()).unwrap(), model.len() as u64);
        }
        conn.commit().unwrap();
        prop_assert_eq!(stored(&db), model);
    }

    #[test]
    fn prop_rollback_restores_store(ops in prop::collection::vec((any::<bool>(), 0usize..9), 0..30)) {
        let db = Database::open_in_memory().unwrap();
        db.add((0..5).map(universe)).unwrap();
        let before = stored(&db);

        let mut conn = db.connection().unwrap();
        conn.begin().unwrap();
        for (add, i) in ops {
            if add {
                conn.add_statement(universe(i)).unwrap();
            } else {
                conn.remove_statements(&subject(i)).unwrap();
            }
        }
        conn.rollback();
        prop_assert_eq!(stored(&db), before);
    }
}
