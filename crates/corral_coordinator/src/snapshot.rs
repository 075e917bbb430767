//! Durable component-scoped snapshots.
//!
//! Payloads are opaque blobs stored as `${base}/${component_id}/${id}.snap`.
//! An in-memory index keeps per-component insertion order; on open it is
//! seeded from whatever already exists on disk (oldest modification first).
//! Read/write failures are transient: logged and surfaced as None/false.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use corral_ids::{ComponentId, SnapshotId};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

const SNAPSHOT_EXT: &str = "snap";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub snapshot_id: SnapshotId,
    pub component_id: ComponentId,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

pub struct SnapshotStore {
    base: PathBuf,
    /// Also serializes writes: every mutation holds this lock across its
    /// filesystem operation.
    index: Mutex<HashMap<ComponentId, Vec<SnapshotMeta>>>,
}

impl SnapshotStore {
    /// Open a store rooted at `base`, creating the directory if needed and
    /// indexing any snapshots already present.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        fs::create_dir_all(&base)
            .with_context(|| format!("Failed to create snapshot directory: {}", base.display()))?;

        let store = Self {
            base,
            index: Mutex::new(HashMap::new()),
        };
        store.reindex()?;
        Ok(store)
    }

    /// Persist a payload for a component. Returns the minted snapshot id, or
    /// None on a write failure (logged).
    pub fn create(&self, component_id: &ComponentId, bytes: &[u8]) -> Option<SnapshotId> {
        let snapshot_id = SnapshotId::generate();
        let mut index = self.lock_index();

        let dir = self.base.join(component_id.as_str());
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(component = %component_id, error = %e, "Snapshot directory create failed");
            return None;
        }

        let path = dir.join(format!("{snapshot_id}.{SNAPSHOT_EXT}"));
        if let Err(e) = fs::write(&path, bytes) {
            warn!(component = %component_id, error = %e, "Snapshot write failed");
            return None;
        }

        index
            .entry(component_id.clone())
            .or_default()
            .push(SnapshotMeta {
                snapshot_id: snapshot_id.clone(),
                component_id: component_id.clone(),
                created_at: Utc::now(),
                size: bytes.len() as u64,
            });
        debug!(component = %component_id, snapshot = %snapshot_id, size = bytes.len(), "Snapshot created");
        Some(snapshot_id)
    }

    /// Load a snapshot payload. Missing, empty, or unreadable files are all
    /// not-found.
    pub fn load(&self, snapshot_id: &SnapshotId) -> Option<Vec<u8>> {
        let path = {
            let index = self.lock_index();
            self.path_for(&index, snapshot_id)?
        };

        match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => {
                warn!(snapshot = %snapshot_id, "Snapshot file is empty");
                None
            }
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(snapshot = %snapshot_id, error = %e, "Snapshot read failed");
                None
            }
        }
    }

    /// Delete a snapshot. False iff the id is unknown or the file could not
    /// be removed.
    pub fn delete(&self, snapshot_id: &SnapshotId) -> bool {
        let mut index = self.lock_index();
        let Some(path) = self.path_for(&index, snapshot_id) else {
            return false;
        };

        if let Err(e) = fs::remove_file(&path) {
            warn!(snapshot = %snapshot_id, error = %e, "Snapshot delete failed");
            return false;
        }
        for metas in index.values_mut() {
            metas.retain(|meta| meta.snapshot_id != *snapshot_id);
        }
        debug!(snapshot = %snapshot_id, "Snapshot deleted");
        true
    }

    /// Snapshots of a component, oldest first (insertion order).
    pub fn list(&self, component_id: &ComponentId) -> Vec<SnapshotMeta> {
        self.lock_index()
            .get(component_id)
            .cloned()
            .unwrap_or_default()
    }

    fn path_for(
        &self,
        index: &HashMap<ComponentId, Vec<SnapshotMeta>>,
        snapshot_id: &SnapshotId,
    ) -> Option<PathBuf> {
        index.values().flatten().find_map(|meta| {
            (meta.snapshot_id == *snapshot_id).then(|| {
                self.base
                    .join(meta.component_id.as_str())
                    .join(format!("{snapshot_id}.{SNAPSHOT_EXT}"))
            })
        })
    }

    /// Seed the index from disk. Component directories become index keys;
    /// files are ordered by modification time so a reopened store lists in
    /// the original creation order.
    fn reindex(&self) -> Result<()> {
        let mut index = self.lock_index();
        index.clear();

        for entry in fs::read_dir(&self.base)
            .with_context(|| format!("Failed to read snapshot base: {}", self.base.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let component_id = match entry.file_name().to_str() {
                Some(name) => ComponentId::from(name),
                None => continue,
            };

            let mut metas = Vec::new();
            for file in fs::read_dir(entry.path())? {
                let file = file?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let meta = file.metadata()?;
                metas.push((
                    meta.modified().ok(),
                    SnapshotMeta {
                        snapshot_id: SnapshotId::from(stem),
                        component_id: component_id.clone(),
                        created_at: meta
                            .modified()
                            .map(DateTime::<Utc>::from)
                            .unwrap_or_else(|_| Utc::now()),
                        size: meta.len(),
                    },
                ));
            }
            metas.sort_by_key(|(modified, _)| *modified);
            index.insert(component_id, metas.into_iter().map(|(_, m)| m).collect());
        }
        Ok(())
    }

    fn lock_index(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ComponentId, Vec<SnapshotMeta>>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("base", &self.base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SnapshotStore) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::open(dir.path().join("snapshots")).unwrap();
        (dir, store)
    }

    #[test]
    fn create_load_roundtrip() {
        let (_dir, store) = store();
        let component = ComponentId::from("registry");

        let id = store.create(&component, b"payload").unwrap();
        assert_eq!(store.load(&id), Some(b"payload".to_vec()));
    }

    #[test]
    fn load_unknown_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.load(&SnapshotId::from("missing")), None);
    }

    #[test]
    fn empty_file_is_not_found() {
        let (_dir, store) = store();
        let component = ComponentId::from("registry");
        let id = store.create(&component, b"").unwrap();
        assert_eq!(store.load(&id), None);
    }

    #[test]
    fn delete_removes_file_and_listing() {
        let (_dir, store) = store();
        let component = ComponentId::from("router");
        let id = store.create(&component, b"x").unwrap();

        assert!(store.delete(&id));
        assert!(store.list(&component).is_empty());
        assert!(!store.delete(&id));
        assert_eq!(store.load(&id), None);
    }

    #[test]
    fn list_is_insertion_ordered_per_component() {
        let (_dir, store) = store();
        let a = ComponentId::from("a");
        let b = ComponentId::from("b");

        let first = store.create(&a, b"1").unwrap();
        let second = store.create(&a, b"22").unwrap();
        store.create(&b, b"333").unwrap();

        let listed = store.list(&a);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].snapshot_id, first);
        assert_eq!(listed[1].snapshot_id, second);
        assert_eq!(listed[1].size, 2);
        assert_eq!(store.list(&b).len(), 1);
    }

    #[test]
    fn reopen_recovers_existing_snapshots() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("snapshots");
        let component = ComponentId::from("registry");

        let id = {
            let store = SnapshotStore::open(&base).unwrap();
            store.create(&component, b"persisted").unwrap()
        };

        let reopened = SnapshotStore::open(&base).unwrap();
        assert_eq!(reopened.load(&id), Some(b"persisted".to_vec()));
        assert_eq!(reopened.list(&component).len(), 1);
    }
}
