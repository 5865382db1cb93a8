//! End-to-End Integration Tests
//!
//! Drives the public `optimist` surface the way an embedding application
//! does: databases over a backend, closure transactions, listeners that
//! cache query results, and backend failures during commit.

#[path = "../common/mod.rs"]
mod common;

mod cached_results;
mod flush_failure;
mod model_properties;
mod namespaces_and_contexts;
