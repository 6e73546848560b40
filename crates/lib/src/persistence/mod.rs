//! Translating planned deltas into backend writes.
//!
//! [`PersistenceSync`] issues the writes for one commit and, after a failure,
//! fetches the canonical sibling lists used to reconcile local state. Writes
//! are independent single-row operations issued in order and the first
//! failure stops the commit. An atomic batch is used instead when the backend
//! offers one and the editor allows it.
//!
//! Undoing a partially applied commit is a separate step:
//! [`compensating_writes`] derives the writes that put the rolled-back order
//! back, and [`renumber_writes`] repairs whatever the backend still holds out
//! of sequence once the canonical lists are refetched.

mod errors;

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

pub use errors::CommitError;

use crate::Result;
use crate::backend::{PersistenceBackend, Write};
use crate::id::ID;
use crate::item::OrderedItem;
use crate::reorder::Delta;
use crate::store::OrderedCollectionStore;
use crate::tenant::TenantContext;

/// What a successful commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub writes: usize,
    /// Whether the writes went out as one atomic batch.
    pub atomic: bool,
}

/// Maps deltas to writes, keeping the planner's order except that an item's
/// ordinal update is deferred until right after its parent update.
pub fn writes_for(deltas: &[Delta]) -> Vec<Write> {
    let reparented: Vec<&ID> = deltas
        .iter()
        .filter_map(|d| match d {
            Delta::Parent { item, .. } => Some(item),
            _ => None,
        })
        .collect();

    let mut writes = Vec::with_capacity(deltas.len());
    for delta in deltas {
        match delta {
            Delta::Ordinal { item, .. } if reparented.contains(&item) => {}
            Delta::Ordinal { item, ordinal } => writes.push(Write::UpdateOrdinal {
                item: item.clone(),
                ordinal: *ordinal,
            }),
            Delta::Parent { item, parent } => {
                writes.push(Write::UpdateParent {
                    item: item.clone(),
                    parent: parent.clone(),
                });
                let own_ordinal = deltas.iter().find_map(|d| match d {
                    Delta::Ordinal { item: i, ordinal } if i == item => Some(*ordinal),
                    _ => None,
                });
                if let Some(ordinal) = own_ordinal {
                    writes.push(Write::UpdateOrdinal {
                        item: item.clone(),
                        ordinal,
                    });
                }
            }
            Delta::Delete { item } => writes.push(Write::DeleteItem { item: item.clone() }),
        }
    }
    writes
}

/// Writes that undo `applied` against the restored tree.
///
/// Every item touched by an applied write gets its restored ordinal back, and
/// a reparented item is moved back under its restored parent first. Deleted
/// items cannot be recreated and are skipped, as are items the restored tree
/// no longer holds.
pub fn compensating_writes(applied: &[Write], restored: &OrderedCollectionStore) -> Vec<Write> {
    let mut writes = Vec::new();
    let mut seen: Vec<&ID> = Vec::new();
    for write in applied {
        let item = write.item();
        if seen.contains(&item) {
            continue;
        }
        let Some(original) = restored.item(item) else {
            continue;
        };
        let reparented = applied
            .iter()
            .any(|w| matches!(w, Write::UpdateParent { item: i, .. } if i == item));
        match write {
            Write::DeleteItem { .. } => continue,
            Write::UpdateParent { .. } | Write::UpdateOrdinal { .. } => {
                if reparented {
                    writes.push(Write::UpdateParent {
                        item: item.clone(),
                        parent: original.parent.clone(),
                    });
                }
                writes.push(Write::UpdateOrdinal {
                    item: item.clone(),
                    ordinal: original.ordinal,
                });
            }
        }
        seen.push(item);
    }
    writes
}

/// Ordinal writes that make each fetched list contiguous from 0 again.
///
/// Lists are ordered the way [`OrderedCollectionStore::reconcile`] orders
/// them (ordinal, then id), so the backend ends up matching the reconciled
/// local state row for row.
pub fn renumber_writes(canonical: &[(ID, Vec<OrderedItem>)]) -> Vec<Write> {
    let mut writes = Vec::new();
    for (_, items) in canonical {
        let mut sorted: Vec<&OrderedItem> = items.iter().collect();
        sorted.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));
        sorted.dedup_by(|a, b| a.id == b.id);
        for (ordinal, item) in sorted.into_iter().enumerate() {
            if item.ordinal != ordinal {
                writes.push(Write::UpdateOrdinal {
                    item: item.id.clone(),
                    ordinal,
                });
            }
        }
    }
    writes
}

/// Issues writes and reconciliation reads for one tenant's course.
#[derive(Clone)]
pub struct PersistenceSync {
    backend: Arc<dyn PersistenceBackend>,
    tenant: TenantContext,
    prefer_atomic_batch: bool,
}

impl std::fmt::Debug for PersistenceSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSync")
            .field("tenant", &self.tenant)
            .field("prefer_atomic_batch", &self.prefer_atomic_batch)
            .finish_non_exhaustive()
    }
}

impl PersistenceSync {
    pub fn new(
        backend: Arc<dyn PersistenceBackend>,
        tenant: TenantContext,
        prefer_atomic_batch: bool,
    ) -> Self {
        Self {
            backend,
            tenant,
            prefer_atomic_batch,
        }
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.backend
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// Whether the next commit will go out as one atomic batch.
    pub fn uses_atomic_batch(&self) -> bool {
        self.prefer_atomic_batch && self.backend.supports_atomic_batch()
    }

    /// Sends `writes` to the backend.
    ///
    /// Fails with [`CommitError::TransientWrite`] if the first write (or the
    /// atomic batch) fails, and with [`CommitError::PartialBatchFailure`] if a
    /// later write fails.
    pub async fn commit(&self, writes: &[Write]) -> std::result::Result<CommitReport, CommitError> {
        if writes.is_empty() {
            return Ok(CommitReport {
                writes: 0,
                atomic: false,
            });
        }

        if self.uses_atomic_batch() {
            self.backend
                .apply_batch(&self.tenant, writes)
                .await
                .map_err(|e| CommitError::TransientWrite {
                    write: writes[0].clone(),
                    source: Box::new(e),
                })?;
            info!(writes = writes.len(), "Committed atomic batch");
            return Ok(CommitReport {
                writes: writes.len(),
                atomic: true,
            });
        }

        for (applied, write) in writes.iter().enumerate() {
            debug!(%write, "Issuing write");
            if let Err(e) = self.backend.apply(&self.tenant, write).await {
                let err = if applied == 0 {
                    CommitError::TransientWrite {
                        write: write.clone(),
                        source: Box::new(e),
                    }
                } else {
                    CommitError::PartialBatchFailure {
                        applied,
                        total: writes.len(),
                        failed: write.clone(),
                        source: Box::new(e),
                    }
                };
                return Err(err);
            }
        }
        info!(writes = writes.len(), "Committed writes");
        Ok(CommitReport {
            writes: writes.len(),
            atomic: false,
        })
    }

    /// Issues every write in `writes` even if some fail, returning how many
    /// the backend accepted. Used for compensation, where each write is
    /// independent and the refetch that follows catches any that failed.
    pub async fn apply_each(&self, writes: &[Write]) -> usize {
        let mut accepted = 0;
        for write in writes {
            match self.backend.apply(&self.tenant, write).await {
                Ok(()) => accepted += 1,
                Err(e) => warn!(%write, error = %e, "Compensating write failed"),
            }
        }
        accepted
    }

    /// Re-reads the canonical sibling list of every container.
    pub async fn fetch_canonical(&self, containers: &[ID]) -> Result<Vec<(ID, Vec<OrderedItem>)>> {
        let mut canonical = Vec::with_capacity(containers.len());
        for container in containers {
            let items = self.backend.list_siblings(&self.tenant, container).await?;
            canonical.push((container.clone(), items));
        }
        Ok(canonical)
    }

    /// Loads the whole course breadth-first from its root.
    pub async fn load_tree(&self) -> Result<OrderedCollectionStore> {
        let root = self.tenant.course_id.clone();
        let mut tree = OrderedCollectionStore::new(root.clone());
        let mut queue = VecDeque::from([root]);

        while let Some(container) = queue.pop_front() {
            let items = self.backend.list_siblings(&self.tenant, &container).await?;
            queue.extend(
                items
                    .iter()
                    .filter(|i| i.kind.as_container().is_some())
                    .map(|i| i.id.clone()),
            );
            tree.reconcile(&container, items);
        }
        debug!(items = tree.item_count(), "Loaded course tree");
        Ok(tree)
    }
}
