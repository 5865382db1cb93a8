//! Storage layer for optimist
//!
//! This crate provides the reference backend behind the isolation layer:
//! - MemoryStore: shared in-memory quad store with per-connection undo journal
//! - Evaluator: nested-loop evaluation of query plans over any quad source
//!
//! Any other store plugs in by implementing `optimist_core::Backend`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod evaluate;
pub mod memory;

pub use evaluate::{Evaluator, QuadSource};
pub use memory::{MemoryConnection, MemoryStore};
