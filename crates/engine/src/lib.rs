//! Embedding surface for optimist
//!
//! This crate wraps the lower layers for applications:
//! - Database: open/close, configuration file, shutdown
//! - Closure transactions with conflict retry
//! - Auto-commit helpers for single operations
//! - Named queries that track when their results change

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod named_query;

pub use database::{Database, OptimistConfig, RetryConfig, CONFIG_FILE_NAME, NAMED_QUERIES_FILE};
pub use named_query::{NamedQuery, ResultStatus};
