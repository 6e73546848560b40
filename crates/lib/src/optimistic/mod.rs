//! Optimistic application of planned moves with snapshot rollback.
//!
//! The [`OptimisticStateManager`] is the only writer of the visible tree. A
//! planned move is applied immediately and the affected containers are
//! marked `CommitPending` until the persistence layer resolves:
//!
//! ```text
//! Stable ──begin──▶ CommitPending ──confirm──▶ Stable
//!                         │
//!                      rollback
//!                         ▼
//!                    Reconciling ──finish_reconcile / abandon_reconcile──▶ Stable
//! ```
//!
//! Any container that is not `Stable` rejects new commits, which serializes
//! writes per container while letting unrelated containers commit
//! concurrently.

mod errors;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub use errors::OptimisticError;

use crate::Result;
use crate::id::ID;
use crate::item::OrderedItem;
use crate::reorder::MovePlan;
use crate::store::{ContainerSnapshot, OrderedCollectionStore};

/// Per-container commit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    #[default]
    Stable,
    CommitPending,
    Reconciling,
}

/// Handle for one pending optimistic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitTicket(u64);

impl CommitTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CommitTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct PendingCommit {
    containers: Vec<ID>,
    snapshots: Vec<ContainerSnapshot>,
}

/// Owns the visible tree and the rollback snapshots for in-flight commits.
#[derive(Debug)]
pub struct OptimisticStateManager {
    tree: Arc<OrderedCollectionStore>,
    states: HashMap<ID, ContainerState>,
    pending: HashMap<CommitTicket, PendingCommit>,
    needs_reconciliation: BTreeSet<ID>,
    next_ticket: u64,
    publisher: watch::Sender<Arc<OrderedCollectionStore>>,
}

impl OptimisticStateManager {
    pub fn new(tree: OrderedCollectionStore) -> Self {
        let tree = Arc::new(tree);
        let (publisher, _) = watch::channel(Arc::clone(&tree));
        Self {
            tree,
            states: HashMap::new(),
            pending: HashMap::new(),
            needs_reconciliation: BTreeSet::new(),
            next_ticket: 1,
            publisher,
        }
    }

    /// The currently visible tree, including unconfirmed changes.
    pub fn tree(&self) -> Arc<OrderedCollectionStore> {
        Arc::clone(&self.tree)
    }

    /// Receives every new visible tree.
    pub fn subscribe(&self) -> watch::Receiver<Arc<OrderedCollectionStore>> {
        self.publisher.subscribe()
    }

    pub fn state(&self, container: &ID) -> ContainerState {
        self.states.get(container).copied().unwrap_or_default()
    }

    /// Containers whose local order may differ from the backend.
    pub fn needs_reconciliation(&self) -> Vec<ID> {
        self.needs_reconciliation.iter().cloned().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn publish(&mut self, tree: OrderedCollectionStore) {
        self.tree = Arc::new(tree);
        self.publisher.send_replace(Arc::clone(&self.tree));
    }

    /// Fails with `ContainerBusy` unless every container is `Stable`.
    pub fn ensure_stable(&self, containers: &[ID]) -> Result<()> {
        for container in containers {
            let state = self.state(container);
            if state != ContainerState::Stable {
                return Err(OptimisticError::ContainerBusy {
                    container: container.clone(),
                    state,
                }
                .into());
            }
        }
        Ok(())
    }

    fn track(&mut self, containers: Vec<ID>, snapshots: Vec<ContainerSnapshot>) -> CommitTicket {
        let ticket = CommitTicket(self.next_ticket);
        self.next_ticket += 1;
        for container in &containers {
            self.states
                .insert(container.clone(), ContainerState::CommitPending);
        }
        self.pending.insert(
            ticket,
            PendingCommit {
                containers,
                snapshots,
            },
        );
        ticket
    }

    fn take(&mut self, ticket: CommitTicket) -> Result<PendingCommit> {
        self.pending
            .remove(&ticket)
            .ok_or_else(|| OptimisticError::UnknownTicket { ticket: ticket.0 }.into())
    }

    /// Snapshots the plan's containers, applies its tree and publishes it.
    ///
    /// The plan must have been computed against the current tree.
    pub fn begin(&mut self, plan: MovePlan) -> Result<CommitTicket> {
        let containers = plan.affected();
        self.ensure_stable(&containers)?;

        let snapshots = containers
            .iter()
            .filter_map(|id| self.tree.snapshot(id))
            .collect();
        let ticket = self.track(containers, snapshots);
        self.publish(plan.tree);
        debug!(%ticket, "Applied optimistic change");
        Ok(ticket)
    }

    /// Marks containers pending without changing the tree, e.g. while the
    /// backend creates an item whose id is not known yet.
    pub fn reserve(&mut self, containers: Vec<ID>) -> Result<CommitTicket> {
        self.ensure_stable(&containers)?;
        let snapshots = containers
            .iter()
            .filter_map(|id| self.tree.snapshot(id))
            .collect();
        Ok(self.track(containers, snapshots))
    }

    /// Appends an item created by the backend to a reserved container.
    pub fn insert(&mut self, ticket: CommitTicket, container: &ID, item: OrderedItem) -> Result<()> {
        let reserved = self
            .pending
            .get(&ticket)
            .is_some_and(|p| p.containers.contains(container));
        if !reserved {
            return Err(OptimisticError::UnknownTicket { ticket: ticket.0 }.into());
        }
        let mut tree = (*self.tree).clone();
        tree.insert(container, item)?;
        self.publish(tree);
        Ok(())
    }

    /// The backend accepted every write: drop the snapshots.
    pub fn confirm(&mut self, ticket: CommitTicket) -> Result<Vec<ID>> {
        let pending = self.take(ticket)?;
        for container in &pending.containers {
            self.states.remove(container);
        }
        debug!(%ticket, "Confirmed optimistic change");
        Ok(pending.containers)
    }

    /// A write failed: restore the snapshots verbatim and flag the containers
    /// for reconciliation. Returns the containers to refetch.
    pub fn rollback(&mut self, ticket: CommitTicket) -> Result<Vec<ID>> {
        let pending = self.take(ticket)?;
        let mut tree = (*self.tree).clone();
        tree.restore(&pending.snapshots);
        self.publish(tree);

        for container in &pending.containers {
            self.states
                .insert(container.clone(), ContainerState::Reconciling);
            self.needs_reconciliation.insert(container.clone());
        }
        warn!(%ticket, containers = ?pending.containers, "Rolled back optimistic change");
        Ok(pending.containers)
    }

    /// Moves flagged, otherwise idle containers into `Reconciling` so a retry
    /// can refetch them. Containers that are busy are skipped.
    pub fn begin_reconcile(&mut self) -> Vec<ID> {
        let ready: Vec<ID> = self
            .needs_reconciliation
            .iter()
            .filter(|id| self.state(id) == ContainerState::Stable)
            .cloned()
            .collect();
        for container in &ready {
            self.states
                .insert(container.clone(), ContainerState::Reconciling);
        }
        ready
    }

    /// Moves idle containers into `Reconciling` for a refresh after a
    /// successful commit.
    pub fn mark_reconciling(&mut self, containers: &[ID]) -> Result<()> {
        self.ensure_stable(containers)?;
        for container in containers {
            self.states
                .insert(container.clone(), ContainerState::Reconciling);
        }
        Ok(())
    }

    /// Applies canonical sibling lists fetched from the backend and returns
    /// the containers to `Stable`.
    pub fn finish_reconcile(&mut self, canonical: Vec<(ID, Vec<OrderedItem>)>) {
        let mut tree = (*self.tree).clone();
        let mut containers = Vec::with_capacity(canonical.len());
        for (container, items) in canonical {
            tree.reconcile(&container, items);
            containers.push(container);
        }
        let pruned = tree.prune_orphans();
        self.publish(tree);

        for container in &containers {
            self.states.remove(container);
            self.needs_reconciliation.remove(container);
        }
        info!(?containers, pruned, "Reconciled containers with backend");
    }

    /// The refetch failed: unblock the containers but keep them flagged.
    pub fn abandon_reconcile(&mut self, containers: &[ID]) {
        for container in containers {
            self.states.remove(container);
        }
        warn!(?containers, "Reconciliation failed; containers stay flagged");
    }

    /// Replaces the whole tree, e.g. after a full reload.
    pub fn replace_tree(&mut self, tree: OrderedCollectionStore) -> Result<()> {
        if !self.pending.is_empty() {
            return Err(OptimisticError::CommitsPending {
                count: self.pending.len(),
            }
            .into());
        }
        self.states.clear();
        self.needs_reconciliation.clear();
        self.publish(tree);
        Ok(())
    }
}
