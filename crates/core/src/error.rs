//! Error types for optimist
//!
//! One error enum is shared by every layer. It separates three kinds of
//! failure that callers handle differently:
//!
//! - isolation conflicts, recoverable by retrying the whole transaction
//! - backend failures (I/O, interrupted lock waits), propagated unchanged
//! - illegal state use, a programming error that should not be retried
//!
//! We use `thiserror` for the `Display` and `Error` implementations.

use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error type for the optimistic store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrently committed change affected a read of this transaction
    #[error("Isolation conflict: observed state changed for {operation}")]
    IsolationConflict {
        /// Description of the read operation that was affected
        operation: String,
    },

    /// Failure reported by the backing store
    #[error("Backend error: {message}")]
    Backend {
        /// Backend-provided description
        message: String,
    },

    /// A lock wait was interrupted (store shutting down)
    #[error("Interrupted while waiting for {lock} lock")]
    Interrupted {
        /// Name of the lock manager
        lock: &'static str,
    },

    /// Operation invoked from the wrong transaction state
    #[error("Illegal state: cannot {operation} while transaction is {state}")]
    IllegalState {
        /// Operation attempted
        operation: &'static str,
        /// State the transaction was in
        state: String,
    },

    /// Invalid caller input (configuration, arguments)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error (configuration and persistence files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create an isolation conflict for the given operation description
    pub fn conflict(operation: impl Into<String>) -> Self {
        StoreError::IsolationConflict {
            operation: operation.into(),
        }
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    /// Create an illegal state error
    pub fn illegal_state(operation: &'static str, state: impl ToString) -> Self {
        StoreError::IllegalState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StoreError::InvalidInput(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal(message.into())
    }

    /// True for isolation conflicts (retry the transaction)
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::IsolationConflict { .. })
    }

    /// True for failures surfaced by the backend or by interrupted lock waits
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            StoreError::Backend { .. } | StoreError::Interrupted { .. } | StoreError::Io(_)
        )
    }

    /// True for operations invoked from the wrong transaction state
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, StoreError::IllegalState { .. })
    }
}
