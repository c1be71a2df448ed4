//! In-process lookup cache from names and paths to entities.
//!
//! The remote service stays the source of truth. Entries can go stale when
//! another process changes the drive; the cache only saves round trips.
//!
//! Paths and bare names live in separate key spaces: a path is stored with a
//! leading `/`, so `"c.txt"` the name and `"c.txt"` the root-level path never
//! collide.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::entity::RemoteEntity;

fn path_key(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

#[derive(Debug, Default)]
pub struct IdCache {
    entries: Mutex<HashMap<String, RemoteEntity>>,
}

impl IdCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, RemoteEntity>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_name(&self, name: &str) -> Option<RemoteEntity> {
        self.entries().get(name).cloned()
    }

    pub fn get_path(&self, path: &str) -> Option<RemoteEntity> {
        self.entries().get(&path_key(path)).cloned()
    }

    pub fn insert_path(&self, path: &str, entity: RemoteEntity) {
        self.entries().insert(path_key(path), entity);
    }

    /// Store an entity under its bare name and, when it has one, its path.
    pub fn remember(&self, entity: &RemoteEntity) {
        let mut entries = self.entries();
        if let Some(path) = &entity.path {
            entries.insert(path_key(path), entity.clone());
        }
        entries.insert(entity.name.clone(), entity.clone());
    }

    pub fn evict_name(&self, name: &str) -> Option<RemoteEntity> {
        self.entries().remove(name)
    }

    pub fn evict_path(&self, path: &str) -> Option<RemoteEntity> {
        self.entries().remove(&path_key(path))
    }

    /// Drop every key that points at `id`. Returns how many were removed.
    pub fn evict_id(&self, id: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entity| entity.id != id);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
