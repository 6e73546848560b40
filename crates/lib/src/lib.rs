//!
//! Outline: ordered course outlines with optimistic reordering.
//!
//! A course is a tree of ordered lists: the course holds modules, a module
//! holds lessons and a lesson holds resources. This library keeps those lists
//! consistent while the user drags and nudges items around, applying every
//! change locally first and persisting it through a backend that offers only
//! single-row writes.
//!
//! ## Core Concepts
//!
//! * **Store (`store::OrderedCollectionStore`)**: the in-memory tree. Every
//!   sibling list is contiguous from 0 and every item sits in exactly one list.
//! * **Planning (`reorder`)**: pure functions turning a request into a new
//!   tree plus the minimal set of ordinal, parent and delete deltas.
//! * **Gestures (`gesture::GestureSession`)**: a drag recognizer that turns
//!   pointer input into drop intents without touching any state.
//! * **Optimistic state (`optimistic::OptimisticStateManager`)**: applies plans
//!   immediately, snapshots for rollback and tracks per-container commit state.
//! * **Persistence (`persistence::PersistenceSync`, `backend`)**: issues
//!   writes, classifies failures and refetches canonical order.
//! * **Editor (`Editor`)**: the facade that ties these together for one
//!   tenant's course.

pub mod backend;
pub mod config;
pub mod editor;
pub mod gesture;
pub mod id;
pub mod item;
pub mod notify;
pub mod optimistic;
pub mod persistence;
pub mod reorder;
pub mod store;
pub mod tenant;

pub use config::EditorConfig;
pub use editor::{CommitOutcome, Editor, PointerOutcome};
pub use id::ID;
pub use item::{ContainerKind, ItemKind, OrderedItem, Payload};
pub use tenant::TenantContext;

/// Result type used throughout the Outline library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Outline library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured tree errors from the store module
    #[error(transparent)]
    Store(store::StoreError),

    /// Busy containers and stale tickets from the optimistic module
    #[error(transparent)]
    Optimistic(optimistic::OptimisticError),

    /// Failed commits from the persistence module
    #[error(transparent)]
    Commit(persistence::CommitError),

    /// Structured storage errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Store(_) => "store",
            Error::Optimistic(_) => "optimistic",
            Error::Commit(_) => "persistence",
            Error::Backend(_) => "backend",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_not_found(),
            Error::Backend(backend_err) => backend_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if a move or delete request was rejected as malformed.
    pub fn is_invalid_move(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_invalid_move(),
            _ => false,
        }
    }

    /// Check if the request should be retried once a pending commit resolves.
    pub fn is_busy(&self) -> bool {
        match self {
            Error::Optimistic(optimistic_err) => optimistic_err.is_busy(),
            _ => false,
        }
    }

    /// Check if this error comes from a failed write to the backend.
    pub fn is_write_failure(&self) -> bool {
        match self {
            Error::Commit(_) => true,
            Error::Backend(backend_err) => backend_err.is_transient(),
            _ => false,
        }
    }

    /// Check if this error indicates a data integrity issue.
    pub fn is_integrity_error(&self) -> bool {
        match self {
            Error::Store(store_err) => store_err.is_integrity_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => backend_err.is_io_error(),
            _ => false,
        }
    }
}
