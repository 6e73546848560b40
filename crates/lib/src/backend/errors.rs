//! Backend error types.
//!
//! Structured errors for storage operations, shared by every
//! [`PersistenceBackend`](super::PersistenceBackend) implementation.

use thiserror::Error;

use crate::id::ID;
use crate::item::ItemKind;

/// Errors that can occur during backend operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Item not found by ID.
    #[error("Item not found: {item}")]
    ItemNotFound {
        /// The ID of the item that was not found
        item: ID,
    },

    /// The parent does not exist or cannot hold items of this kind.
    #[error("{parent} cannot hold a {kind}")]
    InvalidParent { parent: ID, kind: ItemKind },

    /// The backend refused a write; retrying later may succeed.
    #[error("Write to {item} rejected: {reason}")]
    WriteRejected { item: ID, reason: String },

    /// The backend could not be reached.
    #[error("Backend unavailable: {reason}")]
    Unavailable { reason: String },

    /// `apply_batch` was called on a backend without atomic batches.
    #[error("Atomic batch writes are not supported by this backend")]
    BatchUnsupported,

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// File I/O error.
    #[error("File I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A stored row could not be turned back into an item.
    #[error("Corrupt row: {reason}")]
    CorruptRow { reason: String },

    /// SQL database error.
    #[cfg(feature = "sqlite")]
    #[error("SQL error: {reason}")]
    SqlxError {
        reason: String,
        #[source]
        source: Option<sqlx::Error>,
    },
}

impl BackendError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::ItemNotFound { .. })
    }

    /// Check if this error is related to I/O operations.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BackendError::FileIo { .. }
                | BackendError::SerializationFailed { .. }
                | BackendError::DeserializationFailed { .. }
        )
    }

    /// Check if retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::WriteRejected { .. }
            | BackendError::Unavailable { .. }
            | BackendError::FileIo { .. } => true,
            #[cfg(feature = "sqlite")]
            BackendError::SqlxError { .. } => true,
            _ => false,
        }
    }

    /// Get the item ID if this error is about a specific item.
    pub fn item(&self) -> Option<&ID> {
        match self {
            BackendError::ItemNotFound { item } | BackendError::WriteRejected { item, .. } => {
                Some(item)
            }
            BackendError::InvalidParent { parent, .. } => Some(parent),
            _ => None,
        }
    }
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
