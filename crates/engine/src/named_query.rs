//! Named queries with result staleness tracking
//!
//! A named query keeps a query plan under a name together with a result
//! status: when its results last changed and an opaque tag that changes with
//! them. Callers use the tag to revalidate cached results without running
//! the query.
//!
//! The plan is split into basic nodes. After every commit the committed delta
//! is checked against each node with the conflict oracle; a node that could
//! see the delta means the results may have changed. Exclusive-mode commits
//! carry no delta and always count as a change.

use chrono::{DateTime, Utc};
use optimist_concurrency::{
    basic_nodes, ChangeEvent, ChangeListener, Delta, EvaluateOperation, TransactionManager,
};
use optimist_core::{BindingSet, StoreResult, TupleExpr};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// When a named query's results last changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultStatus {
    /// Time of the last commit that affected the results
    pub last_modified: DateTime<Utc>,
    /// Opaque tag, replaced whenever the results change
    pub result_tag: Uuid,
}

impl ResultStatus {
    fn fresh(time: DateTime<Utc>) -> Self {
        Self {
            last_modified: time,
            result_tag: Uuid::new_v4(),
        }
    }
}

/// Serialized form of a named query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NamedQueryRecord {
    pub name: String,
    pub plan: TupleExpr,
    pub status: ResultStatus,
}

/// A stored query plan that tracks when its results change
pub struct NamedQuery {
    name: String,
    plan: TupleExpr,
    nodes: Vec<EvaluateOperation>,
    manager: Weak<TransactionManager>,
    status: RwLock<ResultStatus>,
}

impl NamedQuery {
    pub(crate) fn new(name: String, plan: TupleExpr, manager: &Arc<TransactionManager>) -> Self {
        Self::with_status(name, plan, manager, ResultStatus::fresh(Utc::now()))
    }

    pub(crate) fn restore(record: NamedQueryRecord, manager: &Arc<TransactionManager>) -> Self {
        Self::with_status(record.name, record.plan, manager, record.status)
    }

    fn with_status(
        name: String,
        plan: TupleExpr,
        manager: &Arc<TransactionManager>,
        status: ResultStatus,
    ) -> Self {
        let nodes = basic_nodes(&plan)
            .into_iter()
            .map(|node| EvaluateOperation::new(node, None, BindingSet::new(), true))
            .collect();
        Self {
            name,
            plan,
            nodes,
            manager: Arc::downgrade(manager),
            status: RwLock::new(status),
        }
    }

    /// Name the query was registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stored plan
    pub fn plan(&self) -> &TupleExpr {
        &self.plan
    }

    /// Reads the results depend on, one per basic node of the plan
    pub fn nodes(&self) -> &[EvaluateOperation] {
        &self.nodes
    }

    /// Current result status
    pub fn status(&self) -> ResultStatus {
        *self.status.read()
    }

    /// Time the results last changed
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.status.read().last_modified
    }

    /// Tag identifying the current results
    pub fn result_tag(&self) -> Uuid {
        self.status.read().result_tag
    }

    pub(crate) fn record(&self) -> NamedQueryRecord {
        NamedQueryRecord {
            name: self.name.clone(),
            plan: self.plan.clone(),
            status: self.status(),
        }
    }

    fn is_affected(&self, event: &ChangeEvent) -> bool {
        if event.exclusive {
            return true;
        }
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };
        let deltas: Vec<&Delta> = [event.added.as_deref(), event.removed.as_deref()]
            .into_iter()
            .flatten()
            .filter(|delta| !delta.is_empty())
            .collect();

        for node in &self.nodes {
            for delta in &deltas {
                match manager.affects(delta, node) {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            target: "optimist::engine",
                            query = %self.name,
                            error = %e,
                            "Staleness check failed, assuming results changed"
                        );
                        return true;
                    }
                }
            }
        }
        false
    }

    fn touch(&self, time: DateTime<Utc>) {
        let mut status = self.status.write();
        // Commit times from racing threads can arrive out of order
        let time = time.max(status.last_modified);
        *status = ResultStatus::fresh(time);
    }
}

impl ChangeListener for NamedQuery {
    fn store_changed(&self, event: &ChangeEvent) -> StoreResult<()> {
        if self.is_affected(event) {
            self.touch(event.time);
            debug!(
                target: "optimist::engine",
                query = %self.name,
                txn_id = event.txn_id,
                "Named query results changed"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for NamedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedQuery")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("status", &self.status())
            .finish()
    }
}
