//! SQL-based backend for course outlines.
//!
//! This module provides a SQLite backend that implements the
//! [`PersistenceBackend`] trait using sqlx with `AnyPool`.
//!
//! ## Schema and Migrations
//!
//! The database schema is defined in the [`schema`] module and automatically
//! initialized when connecting. Migrations are code-based functions.

mod storage;

/// Schema definition and migration system.
pub mod schema;

use std::any::Any;

use async_trait::async_trait;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{PersistenceBackend, Write};
use crate::id::ID;
use crate::item::{ItemKind, OrderedItem, Payload};
use crate::tenant::TenantContext;

/// Extension trait for sqlx Result types to simplify error handling.
///
/// Similar to `anyhow::Context`, this trait adds a method to convert
/// sqlx errors to `BackendError::SqlxError` with a context message.
pub(crate) trait SqlxResultExt<T> {
    /// Convert sqlx error to BackendError with context message.
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            BackendError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// SQL backend implementing [`PersistenceBackend`] using sqlx.
///
/// Every write runs on its own pooled connection. `apply_batch` wraps the
/// writes in one transaction, so this backend advertises atomic batches.
pub struct SqlxBackend {
    pool: AnyPool,
}

/// The SQLite flavour of [`SqlxBackend`].
pub type Sqlite = SqlxBackend;

impl std::fmt::Debug for SqlxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxBackend").finish_non_exhaustive()
    }
}

impl SqlxBackend {
    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Open a SQLite database at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        // mode=rwc: read-write-create (create file if it doesn't exist)
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect_sqlite(&url).await
    }

    /// Connect to a SQLite database using a connection URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite:./outline.db")
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let is_in_memory = url.contains("mode=memory");

        // An in-memory database is destroyed when its last connection
        // closes, so keep one open for the lifetime of the pool
        let pool = if is_in_memory {
            AnyPoolOptions::new()
                .max_connections(5)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        } else {
            AnyPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .sql_context("Failed to connect to SQLite")?
        };

        if is_in_memory {
            sqlx::query("PRAGMA busy_timeout = 5000;")
                .execute(&pool)
                .await
                .sql_context("Failed to configure SQLite")?;
        } else {
            sqlx::query(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
            .execute(&pool)
            .await
            .sql_context("Failed to configure SQLite")?;
        }

        let backend = Self { pool };
        schema::initialize(&backend).await?;
        Ok(backend)
    }

    /// Create an in-memory SQLite database.
    ///
    /// The database exists only for the lifetime of this backend instance.
    pub async fn sqlite_in_memory() -> Result<Self> {
        // Shared cache so every pooled connection sees the same database;
        // the unique name keeps instances apart
        let unique_id = uuid::Uuid::new_v4();
        let url = format!("sqlite:file:mem_{unique_id}?mode=memory&cache=shared");
        Self::connect_sqlite(&url).await
    }

    /// Stores an item verbatim, keeping its id and ordinal.
    pub async fn insert_item(&self, ctx: &TenantContext, item: OrderedItem) -> Result<()> {
        storage::insert_item(self, ctx, &item).await
    }
}

#[async_trait]
impl PersistenceBackend for SqlxBackend {
    async fn list_siblings(
        &self,
        ctx: &TenantContext,
        container: &ID,
    ) -> Result<Vec<OrderedItem>> {
        storage::list_siblings(self, ctx, container).await
    }

    async fn update_ordinal(&self, ctx: &TenantContext, item: &ID, ordinal: usize) -> Result<()> {
        storage::apply_one(
            self,
            ctx,
            &Write::UpdateOrdinal {
                item: item.clone(),
                ordinal,
            },
        )
        .await
    }

    async fn update_parent(&self, ctx: &TenantContext, item: &ID, parent: &ID) -> Result<()> {
        storage::apply_one(
            self,
            ctx,
            &Write::UpdateParent {
                item: item.clone(),
                parent: parent.clone(),
            },
        )
        .await
    }

    async fn create_item(
        &self,
        ctx: &TenantContext,
        parent: &ID,
        kind: ItemKind,
        payload: Payload,
    ) -> Result<ID> {
        storage::create_item(self, ctx, parent, kind, payload).await
    }

    async fn delete_item(&self, ctx: &TenantContext, item: &ID) -> Result<()> {
        storage::apply_one(self, ctx, &Write::DeleteItem { item: item.clone() }).await
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }

    async fn apply_batch(&self, ctx: &TenantContext, writes: &[Write]) -> Result<()> {
        storage::apply_batch(self, ctx, writes).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
