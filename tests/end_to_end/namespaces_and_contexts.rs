//! Namespace and Context Tests
//!
//! Namespace and graph changes are buffered like quads: visible inside the
//! transaction, invisible to others until commit, gone after rollback.

use crate::common::*;
use optimist::{Database, QuadPattern, Term};

#[test]
fn test_namespace_changes_apply_on_commit() {
    let db = Database::open_in_memory().unwrap();
    db.transaction(|conn| {
        conn.set_namespace("ex", "http://example.org/")?;
        conn.set_namespace("old", "http://old.example.org/")
    })
    .unwrap();

    let mut writer = db.connection().unwrap();
    writer.begin().unwrap();
    writer.remove_namespace("old").unwrap();
    writer.set_namespace("foaf", "http://xmlns.com/foaf/0.1/").unwrap();

    let inside: Vec<String> = writer.namespaces().unwrap().into_iter().map(|ns| ns.prefix).collect();
    assert_eq!(inside, vec!["ex".to_string(), "foaf".to_string()]);

    let mut other = db.connection().unwrap();
    assert_eq!(other.namespace("foaf").unwrap(), None);
    assert_eq!(
        other.namespace("old").unwrap().as_deref(),
        Some("http://old.example.org/")
    );

    writer.commit().unwrap();
    assert_eq!(
        other.namespace("foaf").unwrap().as_deref(),
        Some("http://xmlns.com/foaf/0.1/")
    );
    assert_eq!(other.namespace("old").unwrap(), None);
}

#[test]
fn test_clear_namespaces_then_redeclare() {
    let db = Database::open_in_memory().unwrap();
    db.transaction(|conn| conn.set_namespace("a", "urn:a/")).unwrap();
    db.transaction(|conn| {
        conn.clear_namespaces()?;
        assert!(conn.namespaces()?.is_empty());
        conn.set_namespace("b", "urn:b/")
    })
    .unwrap();

    let mut conn = db.connection().unwrap();
    let prefixes: Vec<String> = conn.namespaces().unwrap().into_iter().map(|ns| ns.prefix).collect();
    assert_eq!(prefixes, vec!["b".to_string()]);
}

#[test]
fn test_clearing_a_graph() {
    let db = Database::open_in_memory().unwrap();
    db.add(vec![
        quad_in("urn:a", "urn:p", "1", "urn:g1"),
        quad_in("urn:b", "urn:p", "2", "urn:g1"),
        quad_in("urn:c", "urn:p", "3", "urn:g2"),
    ])
    .unwrap();

    let mut conn = db.connection().unwrap();
    conn.begin().unwrap();
    conn.clear(&[Some(Term::iri("urn:g1"))]).unwrap();
    conn.add_statement(quad_in("urn:d", "urn:p", "4", "urn:g3")).unwrap();

    let mut ids = conn.context_ids().unwrap();
    ids.sort();
    assert_eq!(ids, vec![Term::iri("urn:g2"), Term::iri("urn:g3")]);
    assert_eq!(conn.size(&QuadPattern::any()).unwrap(), 2);

    conn.commit().unwrap();
    assert_eq!(db.size(&QuadPattern::any()).unwrap(), 2);
    let graph1 = QuadPattern::any().with_contexts(vec![Some(Term::iri("urn:g1"))]);
    assert_eq!(db.size(&graph1).unwrap(), 0);
}

#[test]
fn test_rollback_discards_graph_and_namespace_changes() {
    let db = Database::open_in_memory().unwrap();
    db.add(vec![quad_in("urn:a", "urn:p", "1", "urn:g1")]).unwrap();
    db.transaction(|conn| conn.set_namespace("ex", "urn:ex/")).unwrap();

    let mut conn = db.connection().unwrap();
    conn.begin().unwrap();
    conn.clear(&[]).unwrap();
    conn.clear_namespaces().unwrap();
    assert!(conn.context_ids().unwrap().is_empty());
    conn.rollback();

    assert_eq!(conn.context_ids().unwrap(), vec![Term::iri("urn:g1")]);
    assert_eq!(conn.namespace("ex").unwrap().as_deref(), Some("urn:ex/"));
    assert_eq!(db.size(&QuadPattern::any()).unwrap(), 1);
}
