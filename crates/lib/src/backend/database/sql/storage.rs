//! Item storage operations for SQL backends.

use std::str::FromStr;

use sqlx::AnyConnection;
use tracing::debug;

use super::{SqlxBackend, SqlxResultExt};
use crate::Result;
use crate::backend::Write;
use crate::backend::errors::BackendError;
use crate::id::ID;
use crate::item::{ContainerKind, ItemKind, OrderedItem, Payload};
use crate::tenant::TenantContext;

type ItemRow = (String, String, i64, String, String);

fn row_to_item(row: ItemRow) -> Result<OrderedItem> {
    let (id, parent, ordinal, kind, payload_json) = row;
    let kind = ItemKind::from_str(&kind).map_err(|reason| BackendError::CorruptRow { reason })?;
    let ordinal = usize::try_from(ordinal).map_err(|_| BackendError::CorruptRow {
        reason: format!("negative ordinal {ordinal} for {id}"),
    })?;
    let payload: Payload = serde_json::from_str(&payload_json)
        .map_err(|e| BackendError::DeserializationFailed { source: e })?;
    let mut item = OrderedItem::new(id, parent, kind, payload);
    item.ordinal = ordinal;
    Ok(item)
}

pub(crate) async fn list_siblings(
    backend: &SqlxBackend,
    ctx: &TenantContext,
    container: &ID,
) -> Result<Vec<OrderedItem>> {
    let rows: Vec<ItemRow> = sqlx::query_as(
        "SELECT id, parent_id, ordinal, kind, payload_json FROM items
         WHERE tenant_id = $1 AND course_id = $2 AND parent_id = $3
         ORDER BY ordinal, id",
    )
    .bind(ctx.tenant_id.clone())
    .bind(ctx.course_id.to_string())
    .bind(container.to_string())
    .fetch_all(backend.pool())
    .await
    .sql_context("Failed to list siblings")?;

    rows.into_iter().map(row_to_item).collect()
}

async fn kind_of(conn: &mut AnyConnection, ctx: &TenantContext, item: &ID) -> Result<Option<ItemKind>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT kind FROM items WHERE tenant_id = $1 AND course_id = $2 AND id = $3",
    )
    .bind(ctx.tenant_id.clone())
    .bind(ctx.course_id.to_string())
    .bind(item.to_string())
    .fetch_optional(&mut *conn)
    .await
    .sql_context("Failed to look up item kind")?;

    match row {
        Some((kind,)) => {
            let kind =
                ItemKind::from_str(&kind).map_err(|reason| BackendError::CorruptRow { reason })?;
            Ok(Some(kind))
        }
        None => Ok(None),
    }
}

async fn check_parent(
    conn: &mut AnyConnection,
    ctx: &TenantContext,
    parent: &ID,
    kind: ItemKind,
) -> Result<()> {
    let parent_kind = if *parent == ctx.course_id {
        Some(ContainerKind::Course)
    } else {
        kind_of(conn, ctx, parent)
            .await?
            .and_then(ItemKind::as_container)
    };
    if parent_kind != Some(kind.parent_kind()) {
        return Err(BackendError::InvalidParent {
            parent: parent.clone(),
            kind,
        }
        .into());
    }
    Ok(())
}

async fn insert_row(conn: &mut AnyConnection, ctx: &TenantContext, item: &OrderedItem) -> Result<()> {
    let payload_json = serde_json::to_string(&item.payload)
        .map_err(|e| BackendError::SerializationFailed { source: e })?;
    sqlx::query(
        "INSERT OR REPLACE INTO items (tenant_id, course_id, id, parent_id, ordinal, kind, payload_json)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(ctx.tenant_id.clone())
    .bind(ctx.course_id.to_string())
    .bind(item.id.to_string())
    .bind(item.parent.to_string())
    .bind(item.ordinal as i64)
    .bind(item.kind.to_string())
    .bind(payload_json)
    .execute(&mut *conn)
    .await
    .sql_context("Failed to insert item")?;
    Ok(())
}

pub(crate) async fn insert_item(
    backend: &SqlxBackend,
    ctx: &TenantContext,
    item: &OrderedItem,
) -> Result<()> {
    let mut conn = backend
        .pool()
        .acquire()
        .await
        .sql_context("Failed to acquire connection")?;
    check_parent(&mut conn, ctx, &item.parent, item.kind).await?;
    insert_row(&mut conn, ctx, item).await
}

pub(crate) async fn create_item(
    backend: &SqlxBackend,
    ctx: &TenantContext,
    parent: &ID,
    kind: ItemKind,
    payload: Payload,
) -> Result<ID> {
    let mut tx = backend
        .pool()
        .begin()
        .await
        .sql_context("Failed to begin transaction")?;
    check_parent(&mut tx, ctx, parent, kind).await?;

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM items WHERE tenant_id = $1 AND course_id = $2 AND parent_id = $3",
    )
    .bind(ctx.tenant_id.clone())
    .bind(ctx.course_id.to_string())
    .bind(parent.to_string())
    .fetch_one(&mut *tx)
    .await
    .sql_context("Failed to count siblings")?;

    let id = ID::generate();
    let mut item = OrderedItem::new(id.clone(), parent.clone(), kind, payload);
    item.ordinal = usize::try_from(count).unwrap_or_default();
    insert_row(&mut tx, ctx, &item).await?;

    tx.commit()
        .await
        .sql_context("Failed to commit transaction")?;
    debug!(%id, %parent, ordinal = item.ordinal, "Created item");
    Ok(id)
}

async fn delete_subtree(conn: &mut AnyConnection, ctx: &TenantContext, item: &ID) -> Result<()> {
    if kind_of(conn, ctx, item).await?.is_none() {
        return Err(BackendError::ItemNotFound { item: item.clone() }.into());
    }

    let mut doomed = vec![item.clone()];
    let mut i = 0;
    while i < doomed.len() {
        let children: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM items WHERE tenant_id = $1 AND course_id = $2 AND parent_id = $3",
        )
        .bind(ctx.tenant_id.clone())
        .bind(ctx.course_id.to_string())
        .bind(doomed[i].to_string())
        .fetch_all(&mut *conn)
        .await
        .sql_context("Failed to collect subtree")?;
        doomed.extend(children.into_iter().map(|(id,)| ID::from(id)));
        i += 1;
    }

    for id in &doomed {
        sqlx::query("DELETE FROM items WHERE tenant_id = $1 AND course_id = $2 AND id = $3")
            .bind(ctx.tenant_id.clone())
            .bind(ctx.course_id.to_string())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .sql_context("Failed to delete item")?;
    }
    Ok(())
}

/// Applies one write on the given connection.
async fn apply_write(conn: &mut AnyConnection, ctx: &TenantContext, write: &Write) -> Result<()> {
    match write {
        Write::UpdateOrdinal { item, ordinal } => {
            let result = sqlx::query(
                "UPDATE items SET ordinal = $1 WHERE tenant_id = $2 AND course_id = $3 AND id = $4",
            )
            .bind(*ordinal as i64)
            .bind(ctx.tenant_id.clone())
            .bind(ctx.course_id.to_string())
            .bind(item.to_string())
            .execute(&mut *conn)
            .await
            .sql_context("Failed to update ordinal")?;
            if result.rows_affected() == 0 {
                return Err(BackendError::ItemNotFound { item: item.clone() }.into());
            }
        }
        Write::UpdateParent { item, parent } => {
            let kind = kind_of(conn, ctx, item)
                .await?
                .ok_or_else(|| BackendError::ItemNotFound { item: item.clone() })?;
            check_parent(conn, ctx, parent, kind).await?;
            sqlx::query(
                "UPDATE items SET parent_id = $1 WHERE tenant_id = $2 AND course_id = $3 AND id = $4",
            )
            .bind(parent.to_string())
            .bind(ctx.tenant_id.clone())
            .bind(ctx.course_id.to_string())
            .bind(item.to_string())
            .execute(&mut *conn)
            .await
            .sql_context("Failed to update parent")?;
        }
        Write::DeleteItem { item } => delete_subtree(conn, ctx, item).await?,
    }
    Ok(())
}

/// A single write may touch several rows (a parent check and an update, or
/// a cascading delete), so it runs in its own transaction.
pub(crate) async fn apply_one(backend: &SqlxBackend, ctx: &TenantContext, write: &Write) -> Result<()> {
    apply_batch(backend, ctx, std::slice::from_ref(write)).await
}

pub(crate) async fn apply_batch(
    backend: &SqlxBackend,
    ctx: &TenantContext,
    writes: &[Write],
) -> Result<()> {
    let mut tx = backend
        .pool()
        .begin()
        .await
        .sql_context("Failed to begin transaction")?;
    for write in writes {
        // Dropping the transaction on error rolls it back
        apply_write(&mut tx, ctx, write).await?;
    }
    tx.commit()
        .await
        .sql_context("Failed to commit transaction")?;
    Ok(())
}
