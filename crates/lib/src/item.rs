//! Items participating in a sibling ordering, and the kinds of containers
//! that own them.
//!
//! A course owns modules, a module owns lessons and a lesson owns resources.
//! Modules and lessons are therefore both items and containers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ID;

/// The kind of an item that lives in a sibling list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Module,
    Lesson,
    Resource,
}

impl ItemKind {
    /// The kind of container this item is listed in.
    pub fn parent_kind(self) -> ContainerKind {
        match self {
            ItemKind::Module => ContainerKind::Course,
            ItemKind::Lesson => ContainerKind::Module,
            ItemKind::Resource => ContainerKind::Lesson,
        }
    }

    /// The container kind this item becomes, if it owns children of its own.
    pub fn as_container(self) -> Option<ContainerKind> {
        match self {
            ItemKind::Module => Some(ContainerKind::Module),
            ItemKind::Lesson => Some(ContainerKind::Lesson),
            ItemKind::Resource => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Module => "module",
            ItemKind::Lesson => "lesson",
            ItemKind::Resource => "resource",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "module" => Ok(ItemKind::Module),
            "lesson" => Ok(ItemKind::Lesson),
            "resource" => Ok(ItemKind::Resource),
            other => Err(format!("unknown item kind '{other}'")),
        }
    }
}

/// The kind of a container owning one ordered sibling list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// The root of the tree. Only one per editor, never an item itself.
    Course,
    Module,
    Lesson,
}

impl ContainerKind {
    /// The kind of every direct child of this container.
    pub fn child_kind(self) -> ItemKind {
        match self {
            ContainerKind::Course => ItemKind::Module,
            ContainerKind::Module => ItemKind::Lesson,
            ContainerKind::Lesson => ItemKind::Resource,
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::Course => f.write_str("course"),
            ContainerKind::Module => f.write_str("module"),
            ContainerKind::Lesson => f.write_str("lesson"),
        }
    }
}

/// Display data carried alongside an item.
///
/// Opaque to the ordering core: nothing in the store, engine or sync layers
/// reads these fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payload {
    pub title: String,
    #[serde(default)]
    pub published: bool,
    /// Reference to an uploaded media object, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Payload {
    /// A payload with only a title set.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Any entity participating in a sibling ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedItem {
    pub id: ID,
    /// The container this item is currently listed in.
    pub parent: ID,
    /// 0-based position among siblings.
    pub ordinal: usize,
    pub kind: ItemKind,
    #[serde(default)]
    pub payload: Payload,
}

impl OrderedItem {
    /// Creates an item with ordinal 0; the store assigns the real ordinal on insert.
    pub fn new(id: impl Into<ID>, parent: impl Into<ID>, kind: ItemKind, payload: Payload) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
            ordinal: 0,
            kind,
            payload,
        }
    }
}
