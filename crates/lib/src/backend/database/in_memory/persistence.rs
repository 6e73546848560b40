//! Persistence operations for the InMemory backend
//!
//! This module handles serialization and file I/O for saving/loading
//! the in-memory state to/from JSON files.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::RwLock;

use super::{CourseItems, InMemory};
use crate::item::OrderedItem;
use crate::{Error, Result, backend::errors::BackendError};

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

/// Helper to check if version is default (0) for serde skip_serializing_if
fn is_v0(v: &u8) -> bool {
    *v == 0
}

/// Validates the persistence version during deserialization.
fn validate_persistence_version<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let version = u8::deserialize(deserializer)?;
    if version != PERSISTENCE_VERSION {
        return Err(serde::de::Error::custom(format!(
            "unsupported persistence version {version}; only version {PERSISTENCE_VERSION} is supported"
        )));
    }
    Ok(version)
}

/// On-disk layout: courses in key order, items sorted by parent and ordinal
/// so files diff cleanly.
#[derive(Serialize, Deserialize)]
struct SerializableState {
    /// File format version for compatibility checking
    #[serde(
        rename = "_v",
        default,
        skip_serializing_if = "is_v0",
        deserialize_with = "validate_persistence_version"
    )]
    version: u8,
    #[serde(default)]
    courses: BTreeMap<String, Vec<OrderedItem>>,
}

fn sorted(items: &CourseItems) -> Vec<OrderedItem> {
    let mut list: Vec<OrderedItem> = items.values().cloned().collect();
    list.sort_by(|a, b| {
        (&a.parent, a.ordinal, &a.id).cmp(&(&b.parent, b.ordinal, &b.id))
    });
    list
}

/// Saves every course to a JSON file.
pub(crate) async fn save_to_file<P: AsRef<Path>>(backend: &InMemory, path: P) -> Result<()> {
    let courses = backend
        .courses
        .read()
        .await
        .iter()
        .map(|(scope, items)| (scope.clone(), sorted(items)))
        .collect();

    let serializable = SerializableState {
        version: PERSISTENCE_VERSION,
        courses,
    };

    let json = serde_json::to_string_pretty(&serializable)
        .map_err(|e| -> Error { BackendError::SerializationFailed { source: e }.into() })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| -> Error { BackendError::FileIo { source: e }.into() })
}

/// Loads the backend state from a JSON file.
///
/// If the file does not exist, a new, empty `InMemory` backend is returned.
pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => {
            let state: SerializableState = serde_json::from_str(&json).map_err(|e| -> Error {
                BackendError::DeserializationFailed { source: e }.into()
            })?;
            let courses: HashMap<String, CourseItems> = state
                .courses
                .into_iter()
                .map(|(scope, items)| {
                    let items = items.into_iter().map(|i| (i.id.clone(), i)).collect();
                    (scope, items)
                })
                .collect();
            Ok(InMemory {
                courses: RwLock::new(courses),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(InMemory::new()),
        Err(e) => Err(BackendError::FileIo { source: e }.into()),
    }
}
