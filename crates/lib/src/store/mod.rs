//! In-memory forest of ordered sibling lists.
//!
//! [`OrderedCollectionStore`] owns the local ordinal state for one course.
//! Every operation is synchronous and either succeeds with the ordering
//! invariant intact or fails without touching anything:
//!
//! * **Contiguity**: for every container, the ordinals of its direct children
//!   are exactly `0..N-1` in list order.
//! * **Single parent**: every item is listed in exactly one container, and its `parent`
//!   field names that container.
//!
//! The store is cheap enough to clone that the reorder engine plans a move by
//! applying it to a copy. Rollback works per container through
//! [`ContainerSnapshot`].

mod errors;


use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub use errors::StoreError;

use crate::Result;
use crate::id::ID;
use crate::item::{ContainerKind, OrderedItem};

/// An entity owning one ordered sibling list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ID,
    /// The container this one is listed in; `None` for the course root.
    pub parent: Option<ID>,
    pub kind: ContainerKind,
    /// Child ids in ordinal order.
    pub children: Vec<ID>,
}

impl Container {
    fn new(id: ID, parent: Option<ID>, kind: ContainerKind) -> Self {
        Self {
            id,
            parent,
            kind,
            children: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Index of `item` in this container's list.
    pub fn position(&self, item: &ID) -> Option<usize> {
        self.children.iter().position(|c| c == item)
    }
}

/// Immutable copy of one container's sibling list, used for rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub container: ID,
    pub parent: Option<ID>,
    pub kind: ContainerKind,
    /// Items in ordinal order, exactly as they were captured.
    pub items: Vec<OrderedItem>,
}

impl ContainerSnapshot {
    /// Item ids in captured order.
    pub fn ids(&self) -> Vec<ID> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

/// The in-memory representation of one course's three-level tree.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedCollectionStore {
    root: ID,
    containers: HashMap<ID, Container>,
    items: HashMap<ID, OrderedItem>,
}

/// Rewrites ordinals so they match list positions.
fn renumber(children: &[ID], items: &mut HashMap<ID, OrderedItem>) {
    for (ordinal, id) in children.iter().enumerate() {
        if let Some(item) = items.get_mut(id) {
            item.ordinal = ordinal;
        }
    }
}

impl OrderedCollectionStore {
    /// Creates a store holding only the empty course root container.
    pub fn new(root: impl Into<ID>) -> Self {
        let root = root.into();
        let mut containers = HashMap::new();
        containers.insert(
            root.clone(),
            Container::new(root.clone(), None, ContainerKind::Course),
        );
        Self {
            root,
            containers,
            items: HashMap::new(),
        }
    }

    /// The id of the course root container.
    pub fn root(&self) -> &ID {
        &self.root
    }

    pub fn container(&self, id: &ID) -> Option<&Container> {
        self.containers.get(id)
    }

    pub fn item(&self, id: &ID) -> Option<&OrderedItem> {
        self.items.get(id)
    }

    /// All container ids, in no particular order.
    pub fn container_ids(&self) -> impl Iterator<Item = &ID> {
        self.containers.keys()
    }

    /// Number of items in the whole tree.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Number of direct children of `container`, or 0 if it is unknown.
    pub fn len(&self, container: &ID) -> usize {
        self.containers.get(container).map_or(0, Container::len)
    }

    /// The direct children of `container` in order. Empty if unknown.
    pub fn siblings(&self, container: &ID) -> Vec<&OrderedItem> {
        self.containers
            .get(container)
            .map(|c| {
                c.children
                    .iter()
                    .filter_map(|id| self.items.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current index of `item` among its siblings.
    pub fn position(&self, item: &ID) -> Option<usize> {
        let parent = &self.items.get(item)?.parent;
        self.containers.get(parent)?.position(item)
    }

    /// Depth-first walk of the whole tree as `(depth, item)` pairs.
    ///
    /// Modules are at depth 0, lessons at 1 and resources at 2.
    pub fn walk(&self) -> Vec<(usize, &OrderedItem)> {
        let mut out = Vec::with_capacity(self.items.len());
        self.walk_into(&self.root, 0, &mut out);
        out
    }

    fn walk_into<'a>(
        &'a self,
        container: &ID,
        depth: usize,
        out: &mut Vec<(usize, &'a OrderedItem)>,
    ) {
        for item in self.siblings(container) {
            out.push((depth, item));
            if self.containers.contains_key(&item.id) {
                self.walk_into(&item.id, depth + 1, out);
            }
        }
    }

    fn require_container(&self, id: &ID) -> Result<&Container> {
        self.containers.get(id).ok_or_else(|| {
            StoreError::ContainerNotFound {
                container: id.clone(),
            }
            .into()
        })
    }

    /// Appends `item` to `container` with ordinal = current sibling count.
    ///
    /// The item's `parent` and `ordinal` fields are overwritten. If the item is
    /// itself a container kind (module or lesson), an empty container is
    /// registered for it.
    pub fn insert(&mut self, container: &ID, mut item: OrderedItem) -> Result<()> {
        let target = self.require_container(container)?;
        if target.kind.child_kind() != item.kind {
            return Err(StoreError::KindMismatch {
                item: item.id.clone(),
                expected: item.kind.parent_kind(),
                actual: target.kind,
            }
            .into());
        }
        if self.items.contains_key(&item.id) || self.containers.contains_key(&item.id) {
            return Err(StoreError::DuplicateItem { item: item.id }.into());
        }

        item.parent = container.clone();
        item.ordinal = target.len();
        if let Some(kind) = item.kind.as_container() {
            self.containers.insert(
                item.id.clone(),
                Container::new(item.id.clone(), Some(container.clone()), kind),
            );
        }
        if let Some(target) = self.containers.get_mut(container) {
            target.children.push(item.id.clone());
        }
        self.items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Moves the item at `from` to `to` inside one container.
    ///
    /// `to` is clamped to the last index. Returns `false` when the move is a
    /// no-op (same index after clamping), in which case nothing changes.
    pub fn move_within(&mut self, container: &ID, from: usize, to: usize) -> Result<bool> {
        let len = self.require_container(container)?.len();
        if from >= len {
            return Err(StoreError::IndexOutOfRange {
                container: container.clone(),
                index: from,
                len,
            }
            .into());
        }
        let to = to.min(len - 1);
        if from == to {
            return Ok(false);
        }

        let Some(target) = self.containers.get_mut(container) else {
            return Ok(false);
        };
        let moved = target.children.remove(from);
        target.children.insert(to, moved);
        renumber(&target.children, &mut self.items);
        Ok(true)
    }

    /// Moves `item` from `source` into `dest` at `dest_index`.
    ///
    /// Both lists are renumbered and the item's parent reference updated.
    /// A move whose source and destination are the same container behaves
    /// like [`move_within`](Self::move_within). Returns `false` for a no-op.
    pub fn move_across(
        &mut self,
        source: &ID,
        dest: &ID,
        item: &ID,
        dest_index: usize,
    ) -> Result<bool> {
        let source_container = self.require_container(source)?;
        let Some(from) = source_container.position(item) else {
            if !self.items.contains_key(item) {
                return Err(StoreError::ItemNotFound { item: item.clone() }.into());
            }
            return Err(StoreError::NotInContainer {
                item: item.clone(),
                container: source.clone(),
            }
            .into());
        };
        let source_kind = source_container.kind;
        if source == dest {
            return self.move_within(source, from, dest_index);
        }

        let dest_container = self.require_container(dest)?;
        if dest_container.kind != source_kind {
            return Err(StoreError::KindMismatch {
                item: item.clone(),
                expected: source_kind,
                actual: dest_container.kind,
            }
            .into());
        }
        if dest_index > dest_container.len() {
            return Err(StoreError::IndexOutOfRange {
                container: dest.clone(),
                index: dest_index,
                len: dest_container.len(),
            }
            .into());
        }

        if let Some(source_container) = self.containers.get_mut(source) {
            source_container.children.remove(from);
            renumber(&source_container.children, &mut self.items);
        }
        if let Some(dest_container) = self.containers.get_mut(dest) {
            dest_container.children.insert(dest_index, item.clone());
            renumber(&dest_container.children, &mut self.items);
        }
        if let Some(moved) = self.items.get_mut(item) {
            moved.parent = dest.clone();
        }
        if let Some(own) = self.containers.get_mut(item) {
            own.parent = Some(dest.clone());
        }
        Ok(true)
    }

    /// Deletes `item` and, if it is a container, everything below it.
    ///
    /// Later siblings shift down by one. Returns the removed items, the
    /// requested item first.
    pub fn remove(&mut self, item: &ID) -> Result<Vec<OrderedItem>> {
        let parent = self
            .items
            .get(item)
            .map(|i| i.parent.clone())
            .ok_or_else(|| StoreError::ItemNotFound { item: item.clone() })?;

        if let Some(container) = self.containers.get_mut(&parent) {
            container.children.retain(|c| c != item);
            renumber(&container.children, &mut self.items);
        }

        let mut removed = Vec::new();
        self.remove_subtree(item, &mut removed);
        Ok(removed)
    }

    fn remove_subtree(&mut self, item: &ID, removed: &mut Vec<OrderedItem>) {
        if let Some(found) = self.items.remove(item) {
            removed.push(found);
        }
        if let Some(container) = self.containers.remove(item) {
            for child in &container.children {
                self.remove_subtree(child, removed);
            }
        }
    }

    /// Replaces the local ordering of `container` with a canonical sequence
    /// read from the backend.
    ///
    /// The sequence is sorted by backend ordinal (ties broken by id) and then
    /// renumbered from 0, so the result is contiguous whatever the backend
    /// returned. Items listed here that are currently in another container are
    /// taken out of it. Items that disappeared from this container are
    /// detached; call [`prune_orphans`](Self::prune_orphans) once every
    /// affected container has been reconciled.
    pub fn reconcile(&mut self, container: &ID, mut canonical: Vec<OrderedItem>) {
        canonical.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));
        canonical.dedup_by(|a, b| a.id == b.id);

        if !self.containers.contains_key(container) {
            let Some(first) = canonical.first() else {
                return;
            };
            let parent = self.items.get(container).map(|i| i.parent.clone());
            self.containers.insert(
                container.clone(),
                Container::new(container.clone(), parent, first.kind.parent_kind()),
            );
        }
        let kind = self.containers[container].kind;
        canonical.retain(|item| item.kind == kind.child_kind());

        let incoming: HashSet<&ID> = canonical.iter().map(|item| &item.id).collect();

        // Detach items that are no longer listed here
        let previous = self
            .containers
            .get_mut(container)
            .map(|c| std::mem::take(&mut c.children))
            .unwrap_or_default();
        for id in &previous {
            if !incoming.contains(id) {
                self.items.remove(id);
            }
        }

        // Pull incoming items out of whatever other list they sit in locally
        for item in &canonical {
            if let Some(existing) = self.items.get(&item.id)
                && existing.parent != *container
            {
                let old_parent = existing.parent.clone();
                if let Some(old) = self.containers.get_mut(&old_parent) {
                    old.children.retain(|c| *c != item.id);
                    renumber(&old.children, &mut self.items);
                }
            }
        }

        let mut children = Vec::with_capacity(canonical.len());
        for (ordinal, mut item) in canonical.into_iter().enumerate() {
            item.parent = container.clone();
            item.ordinal = ordinal;
            if let Some(own_kind) = item.kind.as_container() {
                self.containers
                    .entry(item.id.clone())
                    .and_modify(|c| c.parent = Some(container.clone()))
                    .or_insert_with(|| {
                        Container::new(item.id.clone(), Some(container.clone()), own_kind)
                    });
            }
            children.push(item.id.clone());
            self.items.insert(item.id.clone(), item);
        }
        if let Some(target) = self.containers.get_mut(container) {
            target.children = children;
        }
    }

    /// Drops containers (and everything below them) whose owning item is no
    /// longer in the tree. Returns the number of items removed.
    pub fn prune_orphans(&mut self) -> usize {
        let orphans: Vec<ID> = self
            .containers
            .keys()
            .filter(|id| **id != self.root && !self.items.contains_key(*id))
            .cloned()
            .collect();
        let mut removed = Vec::new();
        for id in orphans {
            if let Some(container) = self.containers.remove(&id) {
                for child in &container.children {
                    self.remove_subtree(child, &mut removed);
                }
            }
        }
        removed.len()
    }

    /// Captures `container`'s sibling list for later [`restore`](Self::restore).
    pub fn snapshot(&self, container: &ID) -> Option<ContainerSnapshot> {
        let c = self.containers.get(container)?;
        Some(ContainerSnapshot {
            container: c.id.clone(),
            parent: c.parent.clone(),
            kind: c.kind,
            items: c
                .children
                .iter()
                .filter_map(|id| self.items.get(id).cloned())
                .collect(),
        })
    }

    /// Ids of every container nested below `item`, including `item` itself
    /// when it is a container. Parents come before their children.
    pub fn containers_below(&self, item: &ID) -> Vec<ID> {
        let mut out = Vec::new();
        let mut stack = vec![item.clone()];
        while let Some(id) = stack.pop() {
            if let Some(container) = self.containers.get(&id) {
                out.push(id);
                stack.extend(container.children.iter().rev().cloned());
            }
        }
        out
    }

    /// Restores a set of snapshots verbatim.
    ///
    /// Snapshots must be restored together when an item moved between them,
    /// otherwise the item would be listed twice. Items that are listed in a
    /// restored container now but were not captured in its snapshot (and were
    /// not re-homed by another snapshot) are dropped.
    pub fn restore(&mut self, snapshots: &[ContainerSnapshot]) {
        let mut displaced = Vec::new();
        for snapshot in snapshots {
            let container = self
                .containers
                .entry(snapshot.container.clone())
                .or_insert_with(|| {
                    Container::new(
                        snapshot.container.clone(),
                        snapshot.parent.clone(),
                        snapshot.kind,
                    )
                });
            container.parent = snapshot.parent.clone();
            let current = std::mem::replace(&mut container.children, snapshot.ids());
            displaced.extend(current);
        }
        for snapshot in snapshots {
            for item in &snapshot.items {
                self.items.insert(item.id.clone(), item.clone());
                if let Some(own) = self.containers.get_mut(&item.id) {
                    own.parent = Some(snapshot.container.clone());
                }
            }
        }
        for id in displaced {
            let still_listed = self
                .items
                .get(&id)
                .and_then(|item| self.containers.get(&item.parent))
                .is_some_and(|c| c.children.contains(&id));
            if !still_listed {
                self.items.remove(&id);
            }
        }
        self.prune_orphans();
    }

    /// Verifies contiguity and single parentage across the whole tree.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for container in self.containers.values() {
            for (index, id) in container.children.iter().enumerate() {
                let violation = |reason: String| StoreError::InvariantViolation {
                    container: container.id.clone(),
                    reason,
                };
                let Some(item) = self.items.get(id) else {
                    return Err(violation(format!("child {id} has no item record")).into());
                };
                if item.ordinal != index {
                    return Err(violation(format!(
                        "item {id} at index {index} has ordinal {}",
                        item.ordinal
                    ))
                    .into());
                }
                if item.parent != container.id {
                    return Err(violation(format!(
                        "item {id} points at parent {}",
                        item.parent
                    ))
                    .into());
                }
                if !seen.insert(id) {
                    return Err(violation(format!("item {id} is listed twice")).into());
                }
            }
        }
        if seen.len() != self.items.len() {
            return Err(StoreError::InvariantViolation {
                container: self.root.clone(),
                reason: format!(
                    "{} items are not listed in any container",
                    self.items.len() - seen.len()
                ),
            }
            .into());
        }
        Ok(())
    }
}
