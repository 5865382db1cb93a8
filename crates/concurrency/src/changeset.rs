//! Changeset history
//!
//! Once another transaction's prepare has marked this one conflicted, every
//! later committed delta is retained here together with the reads this
//! transaction makes afterwards. A read recorded after a changeset that the
//! changeset's delta affects saw state that did not exist when the
//! transaction started.

use crate::delta::Delta;
use crate::operation::EvaluateOperation;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// A committed delta plus the reads observed since it was committed
#[derive(Debug, Clone)]
pub struct ChangeSet {
    added: Arc<Delta>,
    removed: Arc<Delta>,
    reads: FxHashSet<EvaluateOperation>,
}

impl ChangeSet {
    /// New entry with an empty read-set
    pub fn new(added: Arc<Delta>, removed: Arc<Delta>) -> Self {
        Self {
            added,
            removed,
            reads: FxHashSet::default(),
        }
    }

    /// Committed additions
    pub fn added(&self) -> &Delta {
        &self.added
    }

    /// Committed removals
    pub fn removed(&self) -> &Delta {
        &self.removed
    }

    /// Reads made after this entry was recorded
    pub fn reads(&self) -> impl Iterator<Item = &EvaluateOperation> {
        self.reads.iter()
    }

    /// Record a read
    pub fn add_read(&mut self, op: EvaluateOperation) {
        self.reads.insert(op);
    }

    /// Number of distinct reads
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }
}
