//! Optimist - optimistic isolation for quad stores
//!
//! Optimist layers snapshot and serializable isolation over a quad store that
//! offers neither. Transactions buffer their writes and record what they
//! read; at commit, every concurrent transaction whose reads the committed
//! changes could have affected is marked to fail its own commit.
//!
//! # Quick Start
//!
//! ```ignore
//! use optimist::{Database, Quad, QuadPattern, Term};
//!
//! let db = Database::open_in_memory()?;
//! db.transaction(|conn| {
//!     let seen = conn.size(&QuadPattern::any())?;
//!     conn.add_statement(Quad::new(
//!         Term::iri("urn:counter"),
//!         Term::iri("urn:value"),
//!         Term::integer(seen as i64),
//!     ))
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `optimist-core`: terms, quads, query plans, errors, backend traits
//! - `optimist-storage`: in-memory reference backend
//! - `optimist-concurrency`: transaction connections and the shared manager
//! - `optimist-engine`: database handle, configuration, named queries

pub use optimist_concurrency::{
    ChangeEvent, ChangeListener, Delta, EvaluateOperation, IsolationLevel, StatementListener,
    TransactionConnection, TransactionManager, TransactionMetrics, TransactionStatus,
};
pub use optimist_core::{
    Backend, BackendConnection, BindingSet, Dataset, Quad, QuadPattern, StatementPattern,
    StoreError, StoreResult, Term, TupleExpr, ValueExpr, Var,
};
pub use optimist_engine::{Database, NamedQuery, OptimistConfig, RetryConfig, ResultStatus};
pub use optimist_storage::MemoryStore;
