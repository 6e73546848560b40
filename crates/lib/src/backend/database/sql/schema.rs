//! SQL schema definitions and migrations.
//!
//! # Migration System
//!
//! Migrations are code-based functions rather than SQL files.
//!
//! ## Adding a New Migration
//!
//! 1. Increment `SCHEMA_VERSION`
//! 2. Add a new `migrate_vN_to_vM` async function
//! 3. Add the migration to the match statement in `run_migration`

use crate::Result;
use crate::backend::errors::BackendError;

use super::SqlxBackend;

/// Current schema version.
///
/// Increment this when making schema changes that require migration.
pub const SCHEMA_VERSION: i64 = 1;

/// SQL statements to create the schema tables.
pub const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version BIGINT PRIMARY KEY
    )",
    // One row per module, lesson or resource. parent_id is the course id
    // for modules. Ordinals are not unique while a commit is half applied.
    "CREATE TABLE IF NOT EXISTS items (
        tenant_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        id TEXT NOT NULL,
        parent_id TEXT NOT NULL,
        ordinal BIGINT NOT NULL,
        kind TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        PRIMARY KEY (tenant_id, course_id, id)
    )",
];

/// SQL statements to create indexes.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_items_parent ON items(tenant_id, course_id, parent_id, ordinal)",
];

fn schema_error(reason: String, source: sqlx::Error) -> BackendError {
    BackendError::SqlxError {
        reason,
        source: Some(source),
    }
}

/// Initialize the database schema.
///
/// Creates tables and indexes if they don't exist, and handles migrations
/// if the schema version has changed.
pub async fn initialize(backend: &SqlxBackend) -> Result<()> {
    let pool = backend.pool();

    for statement in CREATE_TABLES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| schema_error(format!("Schema creation failed: {e} - SQL: {statement}"), e))?;
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version")
        .fetch_optional(pool)
        .await
        .map_err(|e| schema_error(format!("Failed to check schema version: {e}"), e))?;

    match row {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .map_err(|e| {
                    schema_error(format!("Failed to initialize schema version: {e}"), e)
                })?;
        }
        Some((current,)) if current < SCHEMA_VERSION => {
            migrate(backend, current, SCHEMA_VERSION).await?;
        }
        Some((current,)) if current > SCHEMA_VERSION => {
            return Err(BackendError::SqlxError {
                reason: format!(
                    "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
                ),
                source: None,
            }
            .into());
        }
        Some(_) => {}
    }

    for statement in CREATE_INDEXES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| schema_error(format!("Index creation failed: {e} - SQL: {statement}"), e))?;
    }

    Ok(())
}

/// Run migrations sequentially from one schema version to another.
async fn migrate(backend: &SqlxBackend, from: i64, to: i64) -> Result<()> {
    tracing::info!(from, to, "Starting SQL schema migration");

    let mut current = from;
    while current < to {
        let next = current + 1;
        tracing::info!(from = current, to = next, "Running migration");

        run_migration(backend, current, next).await?;

        sqlx::query("UPDATE schema_version SET version = $1")
            .bind(next)
            .execute(backend.pool())
            .await
            .map_err(|e| {
                schema_error(format!("Failed to update schema version to {next}: {e}"), e)
            })?;
        current = next;
    }

    Ok(())
}

/// Dispatch a single migration step.
async fn run_migration(_backend: &SqlxBackend, from: i64, to: i64) -> Result<()> {
    Err(BackendError::SqlxError {
        reason: format!("no migration defined from schema version {from} to {to}"),
        source: None,
    }
    .into())
}
