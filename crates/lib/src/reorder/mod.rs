//! Pure move planning over an [`OrderedCollectionStore`] snapshot.
//!
//! Nothing here mutates the caller's tree. [`plan`] applies a request to a
//! copy and returns the resulting tree together with the minimal list of
//! [`Delta`]s a backend needs to reach the same state, plus before-snapshots
//! of every container whose sibling list changes.
//!
//! Delta order is part of the contract with the persistence layer. For a
//! cross-container move it is:
//!
//! 1. ordinal shifts in the destination (making room),
//! 2. the subject's parent reference,
//! 3. ordinal compaction in the source.
//!
//! Deletions emit the delete first, then the compaction of later siblings.


use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::id::ID;
use crate::store::{ContainerSnapshot, OrderedCollectionStore, StoreError};

/// A requested structural change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoveRequest {
    /// Reorder inside one container. `to` is clamped to the last index.
    Within { container: ID, from: usize, to: usize },
    /// Move `item` out of `source` into `dest` at `dest_index`.
    Across {
        source: ID,
        dest: ID,
        item: ID,
        dest_index: usize,
    },
}

impl MoveRequest {
    /// Containers whose sibling lists this request touches, destination first.
    pub fn containers(&self) -> Vec<ID> {
        match self {
            MoveRequest::Within { container, .. } => vec![container.clone()],
            MoveRequest::Across { source, dest, .. } if source == dest => vec![source.clone()],
            MoveRequest::Across { source, dest, .. } => vec![dest.clone(), source.clone()],
        }
    }
}

/// Keyboard or button nudge direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards ordinal 0.
    Up,
    Down,
}

/// What a dragged item was released over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropTarget {
    /// Another item; the dragged item takes its index (insert-before).
    Item(ID),
    /// A container's header or the empty space after its last child; appends.
    Container(ID),
}

/// A completed drag handed over by the gesture layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropIntent {
    pub item: ID,
    /// The container the item was in when the drag started.
    pub source: ID,
    pub target: DropTarget,
}

/// One fact a backend must record to match a planned tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    Ordinal { item: ID, ordinal: usize },
    Parent { item: ID, parent: ID },
    Delete { item: ID },
}

/// The outcome of planning a move or deletion.
#[derive(Debug, Clone)]
pub struct MovePlan {
    /// The whole tree after the change.
    pub tree: OrderedCollectionStore,
    /// Writes required to persist the change, in issue order.
    pub deltas: Vec<Delta>,
    /// Pre-change copies of every container whose sibling list changes.
    pub snapshots: Vec<ContainerSnapshot>,
}

impl MovePlan {
    /// Ids of the containers this plan changes.
    pub fn affected(&self) -> Vec<ID> {
        self.snapshots.iter().map(|s| s.container.clone()).collect()
    }
}

/// Ordinal deltas for `container`, comparing list positions before and after.
fn ordinal_deltas(
    before: &OrderedCollectionStore,
    after: &OrderedCollectionStore,
    container: &ID,
) -> Vec<Delta> {
    after
        .siblings(container)
        .into_iter()
        .filter(|item| {
            before
                .item(&item.id)
                .is_none_or(|old| old.ordinal != item.ordinal)
        })
        .map(|item| Delta::Ordinal {
            item: item.id.clone(),
            ordinal: item.ordinal,
        })
        .collect()
}

fn snapshots_of(tree: &OrderedCollectionStore, containers: &[ID]) -> Vec<ContainerSnapshot> {
    containers
        .iter()
        .filter_map(|id| tree.snapshot(id))
        .collect()
}

/// Plans `request` against `tree`.
///
/// Returns `Ok(None)` when the request is valid but changes nothing; callers
/// must then skip persistence entirely.
pub fn plan(tree: &OrderedCollectionStore, request: &MoveRequest) -> Result<Option<MovePlan>> {
    let mut next = tree.clone();
    let changed = match request {
        MoveRequest::Within {
            container,
            from,
            to,
        } => next.move_within(container, *from, *to)?,
        MoveRequest::Across {
            source,
            dest,
            item,
            dest_index,
        } => next.move_across(source, dest, item, *dest_index)?,
    };
    if !changed {
        debug!(?request, "Move is a no-op");
        return Ok(None);
    }

    let deltas = match request {
        MoveRequest::Within { container, .. } => ordinal_deltas(tree, &next, container),
        MoveRequest::Across { source, dest, .. } if source == dest => {
            ordinal_deltas(tree, &next, source)
        }
        MoveRequest::Across {
            source, dest, item, ..
        } => {
            let mut deltas = ordinal_deltas(tree, &next, dest);
            deltas.push(Delta::Parent {
                item: item.clone(),
                parent: dest.clone(),
            });
            deltas.extend(ordinal_deltas(tree, &next, source));
            deltas
        }
    };

    let mut affected = request.containers();
    affected.reverse();
    let snapshots = snapshots_of(tree, &affected);
    debug!(?request, writes = deltas.len(), "Planned move");
    Ok(Some(MovePlan {
        tree: next,
        deltas,
        snapshots,
    }))
}

/// Plans deleting `item` together with everything nested below it.
pub fn plan_delete(tree: &OrderedCollectionStore, item: &ID) -> Result<MovePlan> {
    let parent = tree
        .item(item)
        .map(|i| i.parent.clone())
        .ok_or_else(|| StoreError::ItemNotFound { item: item.clone() })?;

    let mut affected = vec![parent.clone()];
    affected.extend(tree.containers_below(item));
    let snapshots = snapshots_of(tree, &affected);

    let mut next = tree.clone();
    next.remove(item)?;

    let mut deltas = vec![Delta::Delete { item: item.clone() }];
    deltas.extend(ordinal_deltas(tree, &next, &parent));
    debug!(%item, writes = deltas.len(), "Planned delete");
    Ok(MovePlan {
        tree: next,
        deltas,
        snapshots,
    })
}

/// Translates a finished drag into a move request.
///
/// Returns `None` when the drop has no net effect or lands on a target that
/// cannot hold the dragged item; the gesture is then treated as cancelled.
pub fn resolve_drop(tree: &OrderedCollectionStore, intent: &DropIntent) -> Option<MoveRequest> {
    let dragged = tree.item(&intent.item)?;
    if dragged.parent != intent.source {
        return None;
    }
    let from = tree.position(&intent.item)?;

    let (dest, index) = match &intent.target {
        DropTarget::Item(target) if *target == intent.item => return None,
        DropTarget::Item(target) => {
            let over = tree.item(target)?;
            if over.kind == dragged.kind {
                (over.parent.clone(), tree.position(target)?)
            } else if over.kind.as_container() == Some(dragged.kind.parent_kind()) {
                // Released over a container item's header
                (target.clone(), tree.len(target))
            } else {
                return None;
            }
        }
        DropTarget::Container(container) => {
            let found = tree.container(container)?;
            if found.kind.child_kind() != dragged.kind {
                return None;
            }
            (container.clone(), found.len())
        }
    };

    if dest == intent.source {
        let to = index.min(tree.len(&dest).saturating_sub(1));
        if to == from {
            return None;
        }
        Some(MoveRequest::Within {
            container: dest,
            from,
            to,
        })
    } else {
        Some(MoveRequest::Across {
            source: intent.source.clone(),
            dest,
            item: intent.item.clone(),
            dest_index: index,
        })
    }
}

/// Builds the single-step move for a nudge.
///
/// Returns `Ok(None)` at the first position (up) or last position (down):
/// the nudge is disabled there rather than rejected.
pub fn nudge(
    tree: &OrderedCollectionStore,
    item: &ID,
    direction: Direction,
) -> Result<Option<MoveRequest>> {
    let parent = tree
        .item(item)
        .map(|i| i.parent.clone())
        .ok_or_else(|| StoreError::ItemNotFound { item: item.clone() })?;
    let from = tree
        .position(item)
        .ok_or_else(|| StoreError::NotInContainer {
            item: item.clone(),
            container: parent.clone(),
        })?;
    let len = tree.len(&parent);

    let to = match direction {
        Direction::Up if from == 0 => return Ok(None),
        Direction::Up => from - 1,
        Direction::Down if from + 1 >= len => return Ok(None),
        Direction::Down => from + 1,
    };
    Ok(Some(MoveRequest::Within {
        container: parent,
        from,
        to,
    }))
}

/// Whether a nudge button for `item` should be enabled.
pub fn can_nudge(tree: &OrderedCollectionStore, item: &ID, direction: Direction) -> bool {
    matches!(nudge(tree, item, direction), Ok(Some(_)))
}
