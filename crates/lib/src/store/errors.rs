//! Error types for the in-memory ordered collection store.
//!
//! Most variants describe a malformed move request and are grouped by
//! [`StoreError::is_invalid_move`]. They are always raised before any state
//! is touched, so there is never anything to roll back.

use thiserror::Error;

use crate::id::ID;
use crate::item::ContainerKind;

/// Errors raised by [`OrderedCollectionStore`](super::OrderedCollectionStore)
/// operations.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The container is not part of the tree.
    #[error("Container not found: {container}")]
    ContainerNotFound { container: ID },

    /// The item is not part of the tree.
    #[error("Item not found: {item}")]
    ItemNotFound { item: ID },

    /// The item exists but is not a current member of the stated container.
    #[error("Item {item} is not in container {container}")]
    NotInContainer { item: ID, container: ID },

    /// A source or destination index lies outside the sibling list.
    #[error("Index {index} out of range for container {container} with {len} items")]
    IndexOutOfRange {
        container: ID,
        index: usize,
        len: usize,
    },

    /// The destination container holds a different kind of item.
    #[error("Cannot place {item} into a {actual} container; expected {expected}")]
    KindMismatch {
        item: ID,
        expected: ContainerKind,
        actual: ContainerKind,
    },

    /// An item with this id already exists.
    #[error("Item already exists: {item}")]
    DuplicateItem { item: ID },

    /// Sibling ordinals are not the contiguous sequence 0..N-1.
    #[error("Ordering invariant violated in container {container}: {reason}")]
    InvariantViolation { container: ID, reason: String },
}

impl StoreError {
    /// Check if this error is a rejected move request.
    pub fn is_invalid_move(&self) -> bool {
        matches!(
            self,
            StoreError::ContainerNotFound { .. }
                | StoreError::ItemNotFound { .. }
                | StoreError::NotInContainer { .. }
                | StoreError::IndexOutOfRange { .. }
                | StoreError::KindMismatch { .. }
        )
    }

    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ContainerNotFound { .. } | StoreError::ItemNotFound { .. }
        )
    }

    /// Check if this error is related to data integrity
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvariantViolation { .. } | StoreError::DuplicateItem { .. }
        )
    }

    /// Get the container id associated with this error, if any.
    pub fn container(&self) -> Option<&ID> {
        match self {
            StoreError::ContainerNotFound { container }
            | StoreError::NotInContainer { container, .. }
            | StoreError::IndexOutOfRange { container, .. }
            | StoreError::InvariantViolation { container, .. } => Some(container),
            _ => None,
        }
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
