//! File-backed directory
//!
//! A snapshot is a JSON document holding the scope catalog of each realm and
//! the scope ids attached to each parent:
//!
//! ```json
//! {
//!   "catalog": { "master": [{ "id": "s1", "name": "email" }] },
//!   "bindings": { "client-default:master/web": ["s1"] }
//! }
//! ```
//!
//! Binding keys are the `Display` form of [`ParentKey`]. Reads are never
//! stale, so every wait converges on its first poll.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{Directory, DirectoryError, Item, ParentKey};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub catalog: BTreeMap<String, Vec<Item>>,
    #[serde(default)]
    pub bindings: BTreeMap<String, Vec<String>>,
}

/// Directory backed by an in-memory [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotDirectory {
    snapshot: Mutex<Snapshot>,
}

impl SnapshotDirectory {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SnapshotError> {
        Ok(Self::new(serde_json::from_str(content)?))
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(&*self.state())?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let content = self.to_json()?;
        std::fs::write(path, content + "\n").map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "snapshot written");
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state().clone()
    }

    fn state(&self) -> MutexGuard<'_, Snapshot> {
        // Every mutation is a single push/retain, so a poisoned lock still holds valid data
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lookup<'a>(catalog: &'a BTreeMap<String, Vec<Item>>, realm: &str, id: &str) -> Option<&'a Item> {
    catalog.get(realm)?.iter().find(|item| item.id == id)
}

#[async_trait]
impl Directory for SnapshotDirectory {
    async fn list(&self, parent: &ParentKey) -> Result<Vec<Item>, DirectoryError> {
        let state = self.state();
        let ids = state
            .bindings
            .get(&parent.to_string())
            .ok_or_else(|| DirectoryError::NotFound(parent.to_string()))?;

        ids.iter()
            .map(|id| {
                lookup(&state.catalog, parent.realm(), id)
                    .cloned()
                    .ok_or_else(|| {
                        DirectoryError::Remote(format!(
                            "scope id '{id}' bound to {parent} is not in the catalog of realm {}",
                            parent.realm()
                        ))
                    })
            })
            .collect()
    }

    async fn catalog(&self, realm: &str) -> Result<Vec<Item>, DirectoryError> {
        self.state()
            .catalog
            .get(realm)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("realm {realm}")))
    }

    async fn attach(&self, parent: &ParentKey, item_id: &str) -> Result<(), DirectoryError> {
        let mut state = self.state();
        if lookup(&state.catalog, parent.realm(), item_id).is_none() {
            return Err(DirectoryError::NotFound(format!("scope {item_id}")));
        }

        let ids = state
            .bindings
            .get_mut(&parent.to_string())
            .ok_or_else(|| DirectoryError::NotFound(parent.to_string()))?;
        if !ids.iter().any(|id| id == item_id) {
            ids.push(item_id.to_string());
        }
        Ok(())
    }

    async fn detach(&self, parent: &ParentKey, item_id: &str) -> Result<(), DirectoryError> {
        let mut state = self.state();
        let ids = state
            .bindings
            .get_mut(&parent.to_string())
            .ok_or_else(|| DirectoryError::NotFound(parent.to_string()))?;
        ids.retain(|id| id != item_id);
        Ok(())
    }
}
