//! Change notifications
//!
//! Two kinds of observers:
//! - [`StatementListener`]: per connection, told about every logical add and
//!   remove as it happens, before anything reaches the backend
//! - [`ChangeListener`]: per store, told once per committed transaction with
//!   a [`ChangeEvent`]

use crate::delta::Delta;
use chrono::{DateTime, Utc};
use optimist_core::{Quad, StoreResult};
use std::sync::Arc;

/// Summary of one committed transaction
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Id of the committing transaction
    pub txn_id: u64,
    /// Quads added; `None` when the transaction committed in exclusive mode
    pub added: Option<Arc<Delta>>,
    /// Quads removed; `None` when the transaction committed in exclusive mode
    pub removed: Option<Arc<Delta>>,
    /// Writes bypassed buffering, so no delta was tracked
    pub exclusive: bool,
    /// At least one statement was added
    pub statements_added: bool,
    /// At least one statement was removed
    pub statements_removed: bool,
    /// Commit time
    pub time: DateTime<Utc>,
}

impl ChangeEvent {
    /// Event for a buffered commit
    pub fn buffered(txn_id: u64, added: Arc<Delta>, removed: Arc<Delta>) -> Self {
        Self {
            txn_id,
            statements_added: !added.is_empty(),
            statements_removed: !removed.is_empty(),
            added: Some(added),
            removed: Some(removed),
            exclusive: false,
            time: Utc::now(),
        }
    }

    /// Event for an exclusive-mode commit
    pub fn exclusive(txn_id: u64, statements_added: bool, statements_removed: bool) -> Self {
        Self {
            txn_id,
            added: None,
            removed: None,
            exclusive: true,
            statements_added,
            statements_removed,
            time: Utc::now(),
        }
    }

    /// True if the commit changed nothing that was tracked
    pub fn is_empty(&self) -> bool {
        !self.exclusive && !self.statements_added && !self.statements_removed
    }
}

/// Observer of committed transactions
pub trait ChangeListener: Send + Sync {
    /// Called after a transaction commits
    ///
    /// # Errors
    ///
    /// Failures are logged by the caller and never undo the commit.
    fn store_changed(&self, event: &ChangeEvent) -> StoreResult<()>;
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) -> StoreResult<()> + Send + Sync,
{
    fn store_changed(&self, event: &ChangeEvent) -> StoreResult<()> {
        self(event)
    }
}

/// Observer of one connection's logical writes
pub trait StatementListener: Send + Sync {
    /// A quad became visible to the connection
    fn statement_added(&self, quad: &Quad);

    /// A quad stopped being visible to the connection
    fn statement_removed(&self, quad: &Quad);
}
