//! Optimistic isolation engine for optimist
//!
//! This crate decides whether concurrently running transactions over a quad
//! store may commit:
//! - Delta: buffered added/removed quads of one transaction
//! - EvaluateOperation: one recorded read
//! - DeltaMerger: rewrites a plan so a delta shows through it
//! - ConflictOracle: does a delta affect a recorded read?
//! - TransactionConnection: buffered, read-tracking transaction state machine
//! - TransactionManager: lock choreography and the prepare-time conflict scan
//!
//! Reads and writes never block on other transactions; conflicts are found
//! when a transaction prepares.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changeset;
pub mod delta;
pub mod event;
pub mod exclusion;
pub mod isolation;
pub mod lock;
pub mod manager;
pub mod merger;
pub mod metrics;
pub mod operation;
pub mod oracle;
mod state;
pub mod transaction;

pub use changeset::ChangeSet;
pub use delta::Delta;
pub use event::{ChangeEvent, ChangeListener, StatementListener};
pub use exclusion::{basic_nodes, is_excluding};
pub use isolation::IsolationLevel;
pub use lock::{Lock, LockManager, LockMode};
pub use manager::{TransactionManager, DEFAULT_LARGE_BLOCK};
pub use merger::DeltaMerger;
pub use metrics::TransactionMetrics;
pub use operation::EvaluateOperation;
pub use oracle::{ConflictOracle, MARKER};
pub use state::TransactionStatus;
pub use transaction::TransactionConnection;
