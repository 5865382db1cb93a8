//! Core types and traits for optimist
//!
//! This crate defines the foundational types used throughout the system:
//! - Term, Quad, QuadPattern: RDF values and quad selection
//! - TupleExpr: immutable query-plan algebra with a folding rewrite pass
//! - BindingSet, Dataset: solution rows and graph selection
//! - StoreError: error type shared by every layer
//! - Backend, BackendConnection: the black-box quad store interface

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algebra;
pub mod bindings;
pub mod error;
pub mod pattern;
pub mod traits;
pub mod types;

pub use algebra::{
    CompareOp, ExtensionElem, ExternalQuads, PlanFolder, Scope, StatementPattern, TupleExpr,
    ValueExpr, Var,
};
pub use bindings::{BindingSet, Dataset};
pub use error::{StoreError, StoreResult};
pub use traits::{Backend, BackendConnection, BindingIter, QuadIter};
pub use types::{Literal, Namespace, Quad, QuadPattern, Term};
