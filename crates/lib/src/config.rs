//! Editor configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::gesture::GestureConfig;

/// Tunables for an [`Editor`](crate::Editor).
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub gesture: GestureConfig,
    /// Send a commit as one atomic batch when the backend supports it
    /// (default: true).
    pub prefer_atomic_batch: bool,
    /// Refetch affected containers after every successful commit, not only
    /// after failures (default: false).
    pub reload_after_commit: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            gesture: GestureConfig::default(),
            prefer_atomic_batch: true,
            reload_after_commit: false,
        }
    }
}

impl EditorConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub async fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}
