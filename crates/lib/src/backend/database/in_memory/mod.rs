//! In-memory backend implementation
//!
//! This module provides an in-memory implementation of the
//! [`PersistenceBackend`] trait, suitable for testing, development, or a
//! single-user CLI that saves the whole state to a JSON file between runs.

mod persistence;

use std::any::Any;
use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{PersistenceBackend, Write};
use crate::id::ID;
use crate::item::{ContainerKind, ItemKind, OrderedItem, Payload};
use crate::tenant::TenantContext;

/// Items of one tenant's course, keyed by id.
pub(crate) type CourseItems = HashMap<ID, OrderedItem>;

/// A simple in-memory backend keeping every course in a `HashMap`.
///
/// Data is scoped by [`TenantContext`], so one instance can hold many
/// courses. It provides basic persistence via `save_to_file` and
/// `load_from_file`, serializing the maps to JSON.
///
/// Batches are applied under a single write lock, so this backend advertises
/// atomic batches.
#[derive(Debug, Default)]
pub struct InMemory {
    /// Course storage keyed by `tenant/course`
    pub(crate) courses: RwLock<HashMap<String, CourseItems>>,
}

fn scope(ctx: &TenantContext) -> String {
    ctx.to_string()
}

/// Fails unless `parent` can hold an item of `kind`.
fn check_parent(
    ctx: &TenantContext,
    items: &CourseItems,
    parent: &ID,
    kind: ItemKind,
) -> Result<()> {
    let parent_kind = if *parent == ctx.course_id {
        Some(ContainerKind::Course)
    } else {
        items.get(parent).and_then(|p| p.kind.as_container())
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

/// Applies one write to a course map.
fn apply_write(ctx: &TenantContext, items: &mut CourseItems, write: &Write) -> Result<()> {
    match write {
        Write::UpdateOrdinal { item, ordinal } => {
            let found = items
                .get_mut(item)
                .ok_or_else(|| BackendError::ItemNotFound { item: item.clone() })?;
            found.ordinal = *ordinal;
        }
        Write::UpdateParent { item, parent } => {
            let kind = items
                .get(item)
                .map(|i| i.kind)
                .ok_or_else(|| BackendError::ItemNotFound { item: item.clone() })?;
            check_parent(ctx, items, parent, kind)?;
            if let Some(found) = items.get_mut(item) {
                found.parent = parent.clone();
            }
        }
        Write::DeleteItem { item } => {
            if !items.contains_key(item) {
                return Err(BackendError::ItemNotFound { item: item.clone() }.into());
            }
            let mut doomed = vec![item.clone()];
            let mut i = 0;
            while i < doomed.len() {
                let children: Vec<ID> = items
                    .values()
                    .filter(|c| c.parent == doomed[i])
                    .map(|c| c.id.clone())
                    .collect();
                doomed.extend(children);
                i += 1;
            }
            for id in &doomed {
                items.remove(id);
            }
        }
    }
    Ok(())
}

impl InMemory {
    /// Creates a new, empty `InMemory` backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an item verbatim, keeping its id and ordinal.
    ///
    /// Used to seed fixtures and imports; the parent must already exist.
    pub async fn insert_item(&self, ctx: &TenantContext, item: OrderedItem) -> Result<()> {
        let mut courses = self.courses.write().await;
        let items = courses.entry(scope(ctx)).or_default();
        check_parent(ctx, items, &item.parent, item.kind)?;
        items.insert(item.id.clone(), item);
        Ok(())
    }

    /// Looks up a single item.
    pub async fn get_item(&self, ctx: &TenantContext, item: &ID) -> Option<OrderedItem> {
        let courses = self.courses.read().await;
        courses.get(&scope(ctx)).and_then(|c| c.get(item)).cloned()
    }

    /// Number of items stored for a course.
    pub async fn item_count(&self, ctx: &TenantContext) -> usize {
        let courses = self.courses.read().await;
        courses.get(&scope(ctx)).map_or(0, HashMap::len)
    }

    /// Saves the entire backend state to a specified file as JSON.
    ///
    /// # Arguments
    /// * `path` - The path to the file where the state should be saved.
    ///
    /// # Returns
    /// A `Result` indicating success or an I/O or serialization error.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads the backend state from a specified JSON file.
    ///
    /// If the file does not exist, a new, empty `InMemory` backend is returned.
    ///
    /// # Arguments
    /// * `path` - The path to the file from which to load the state.
    ///
    /// # Returns
    /// A `Result` containing the loaded `InMemory` backend or an I/O or deserialization error.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }
}

#[async_trait]
impl PersistenceBackend for InMemory {
    async fn list_siblings(
        &self,
        ctx: &TenantContext,
        container: &ID,
    ) -> Result<Vec<OrderedItem>> {
        let courses = self.courses.read().await;
        let mut siblings: Vec<OrderedItem> = courses
            .get(&scope(ctx))
            .map(|items| {
                items
                    .values()
                    .filter(|i| i.parent == *container)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        siblings.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));
        Ok(siblings)
    }

    async fn update_ordinal(&self, ctx: &TenantContext, item: &ID, ordinal: usize) -> Result<()> {
        let mut courses = self.courses.write().await;
        let items = courses.entry(scope(ctx)).or_default();
        apply_write(
            ctx,
            items,
            &Write::UpdateOrdinal {
                item: item.clone(),
                ordinal,
            },
        )
    }

    async fn update_parent(&self, ctx: &TenantContext, item: &ID, parent: &ID) -> Result<()> {
        let mut courses = self.courses.write().await;
        let items = courses.entry(scope(ctx)).or_default();
        apply_write(
            ctx,
            items,
            &Write::UpdateParent {
                item: item.clone(),
                parent: parent.clone(),
            },
        )
    }

    async fn create_item(
        &self,
        ctx: &TenantContext,
        parent: &ID,
        kind: ItemKind,
        payload: Payload,
    ) -> Result<ID> {
        let mut courses = self.courses.write().await;
        let items = courses.entry(scope(ctx)).or_default();
        check_parent(ctx, items, parent, kind)?;

        let id = ID::generate();
        let mut item = OrderedItem::new(id.clone(), parent.clone(), kind, payload);
        item.ordinal = items.values().filter(|i| i.parent == *parent).count();
        debug!(%id, %parent, ordinal = item.ordinal, "Created item");
        items.insert(id.clone(), item);
        Ok(id)
    }

    async fn delete_item(&self, ctx: &TenantContext, item: &ID) -> Result<()> {
        let mut courses = self.courses.write().await;
        let items = courses.entry(scope(ctx)).or_default();
        apply_write(ctx, items, &Write::DeleteItem { item: item.clone() })
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }

    async fn apply_batch(&self, ctx: &TenantContext, writes: &[Write]) -> Result<()> {
        let mut courses = self.courses.write().await;
        let items = courses.entry(scope(ctx)).or_default();
        // Work on a copy so a failing write leaves nothing behind
        let mut staged = items.clone();
        for write in writes {
            apply_write(ctx, &mut staged, write)?;
        }
        *items = staged;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
