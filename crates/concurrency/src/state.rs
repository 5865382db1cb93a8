//! Per-transaction state shared with the coordinator
//!
//! Everything another transaction's prepare needs to see lives here, behind
//! one mutex per connection. The coordinator only ever touches the read-set,
//! the conflict mark and the changeset history; the buffers are private to
//! the owning connection.

use crate::changeset::ChangeSet;
use crate::delta::Delta;
use crate::operation::EvaluateOperation;
use optimist_core::Term;
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a transaction connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionStatus {
    /// No transaction; reads go straight to the backend
    #[default]
    Inactive,
    /// Writes are buffered and reads recorded
    Active,
    /// Holding the store exclusively; writes go straight through
    ActiveExclusive,
    /// Prepared without conflict; only commit or rollback remain
    Prepared,
    /// Prepare found a conflict; commit raises it
    Conflicted,
}

impl TransactionStatus {
    /// True while a transaction is open
    pub fn is_active(self) -> bool {
        !matches!(self, TransactionStatus::Inactive)
    }

    /// True if new writes are accepted
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            TransactionStatus::Active | TransactionStatus::ActiveExclusive
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Inactive => "inactive",
            TransactionStatus::Active => "active",
            TransactionStatus::ActiveExclusive => "active-exclusive",
            TransactionStatus::Prepared => "prepared",
            TransactionStatus::Conflicted => "conflicted",
        };
        f.write_str(name)
    }
}

/// Buffers and conflict tracking of one transaction
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    pub status: TransactionStatus,
    /// Writes bypassed buffering at some point
    pub exclusive: bool,
    /// Writes made while exclusive, for the change event
    pub exclusive_added: bool,
    pub exclusive_removed: bool,

    pub added: Arc<Delta>,
    pub removed: Arc<Delta>,
    pub removed_contexts: BTreeSet<Term>,
    pub added_namespaces: BTreeMap<String, String>,
    pub removed_prefixes: BTreeSet<String>,

    pub read_set: FxHashSet<EvaluateOperation>,
    pub changesets: Vec<ChangeSet>,
    /// Description of the read another transaction's commit affected
    pub conflict: Option<String>,
}

impl TransactionState {
    /// Clear everything and enter `status`
    pub fn reset(&mut self, status: TransactionStatus) {
        *self = TransactionState {
            status,
            ..TransactionState::default()
        };
    }

    /// True if no quad writes are buffered
    pub fn is_read_only(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// True if nothing at all is buffered
    pub fn is_clean(&self) -> bool {
        self.is_read_only()
            && self.removed_contexts.is_empty()
            && self.added_namespaces.is_empty()
            && self.removed_prefixes.is_empty()
    }

    pub fn added_mut(&mut self) -> &mut Delta {
        Arc::make_mut(&mut self.added)
    }

    pub fn removed_mut(&mut self) -> &mut Delta {
        Arc::make_mut(&mut self.removed)
    }

    /// Record a read in the read-set and in every retained changeset
    pub fn add_read(&mut self, op: EvaluateOperation) {
        for changeset in &mut self.changesets {
            changeset.add_read(op.clone());
        }
        self.read_set.insert(op);
    }

    /// Drop the read-set and changesets; nothing can conflict with an
    /// exclusive holder. A conflict already recorded is kept.
    pub fn forget_reads(&mut self) {
        self.read_set.clear();
        self.changesets.clear();
    }
}
