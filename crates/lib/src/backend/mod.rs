//! Storage backends for course outlines.
//!
//! The [`PersistenceBackend`] trait is the only way the core talks to
//! durable storage. Every call carries a [`TenantContext`]; backends scope
//! their data by it and the core never inspects it.
//!
//! Writes are single-row and independent. A backend that can apply several
//! writes atomically advertises it through
//! [`supports_atomic_batch`](PersistenceBackend::supports_atomic_batch).

use std::any::Any;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::id::ID;
use crate::item::{ItemKind, OrderedItem, Payload};
use crate::tenant::TenantContext;

pub mod database;
pub mod errors;
mod faulty;

pub use database::in_memory::InMemory;
#[cfg(feature = "sqlite")]
pub use database::sql::Sqlite;
pub use errors::BackendError;
pub use faulty::{FaultyBackend, WriteKind};

/// One backend write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Write {
    UpdateOrdinal { item: ID, ordinal: usize },
    UpdateParent { item: ID, parent: ID },
    DeleteItem { item: ID },
}

impl Write {
    /// The item this write touches.
    pub fn item(&self) -> &ID {
        match self {
            Write::UpdateOrdinal { item, .. }
            | Write::UpdateParent { item, .. }
            | Write::DeleteItem { item } => item,
        }
    }
}

impl std::fmt::Display for Write {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Write::UpdateOrdinal { item, ordinal } => write!(f, "ordinal({item}) = {ordinal}"),
            Write::UpdateParent { item, parent } => write!(f, "parent({item}) = {parent}"),
            Write::DeleteItem { item } => write!(f, "delete({item})"),
        }
    }
}

/// Durable storage for ordered items.
///
/// All implementations must be `Send + Sync` so an editor can share one
/// backend across tasks. Methods take `&self`; implementations handle their
/// own locking.
#[async_trait]
pub trait PersistenceBackend: Send + Sync + Any {
    /// Direct children of `container`, sorted by ordinal (ties by id).
    ///
    /// An unknown container has no children.
    async fn list_siblings(&self, ctx: &TenantContext, container: &ID)
    -> Result<Vec<OrderedItem>>;

    async fn update_ordinal(&self, ctx: &TenantContext, item: &ID, ordinal: usize) -> Result<()>;

    /// Re-parents `item`; its ordinal is left as is.
    async fn update_parent(&self, ctx: &TenantContext, item: &ID, parent: &ID) -> Result<()>;

    /// Creates an item appended after the parent's current children and
    /// returns its new id.
    async fn create_item(
        &self,
        ctx: &TenantContext,
        parent: &ID,
        kind: ItemKind,
        payload: Payload,
    ) -> Result<ID>;

    /// Deletes `item` and everything nested below it. Siblings are not
    /// renumbered.
    async fn delete_item(&self, ctx: &TenantContext, item: &ID) -> Result<()>;

    /// Whether [`apply_batch`](Self::apply_batch) is all-or-nothing.
    fn supports_atomic_batch(&self) -> bool {
        false
    }

    /// Applies every write or none of them.
    async fn apply_batch(&self, ctx: &TenantContext, writes: &[Write]) -> Result<()> {
        let _ = (ctx, writes);
        Err(BackendError::BatchUnsupported.into())
    }

    /// Applies a single write through the per-row methods.
    async fn apply(&self, ctx: &TenantContext, write: &Write) -> Result<()> {
        match write {
            Write::UpdateOrdinal { item, ordinal } => {
                self.update_ordinal(ctx, item, *ordinal).await
            }
            Write::UpdateParent { item, parent } => self.update_parent(ctx, item, parent).await,
            Write::DeleteItem { item } => self.delete_item(ctx, item).await,
        }
    }

    /// Returns a reference to the backend as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}
