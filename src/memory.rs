//! In-process [`RemoteDrive`] implementation.
//!
//! Behaves like the remote service where this crate depends on it: duplicate
//! names are allowed, listings come back in creation order and a missing id is
//! a 404. Useful for tests and dry runs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::entity::FOLDER_MIME_TYPE;
use crate::error::{DriveError, Result};
use crate::models::{FileMetadata, Permission, PermissionRequest};
use crate::query::{Clause, Query};
use crate::remote::{EntityPatch, NewEntity, RemoteDrive, RequestOptions};

const ROOT_ID: &str = "root";

struct StoredEntity {
    metadata: FileMetadata,
    content: Vec<u8>,
    permissions: Vec<PermissionRequest>,
}

#[derive(Default)]
struct State {
    entities: Vec<StoredEntity>,
    next_id: u64,
}

impl State {
    fn position(&self, id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.metadata.id == id)
    }

    fn find(&self, id: &str) -> Result<&StoredEntity> {
        self.position(id)
            .map(|idx| &self.entities[idx])
            .ok_or_else(|| missing(id))
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut StoredEntity> {
        match self.position(id) {
            Some(idx) => Ok(&mut self.entities[idx]),
            None => Err(missing(id)),
        }
    }

    fn is_container(&self, id: &str) -> bool {
        id == ROOT_ID
            || self
                .find(id)
                .map(|e| e.metadata.mime_type.as_deref() == Some(FOLDER_MIME_TYPE))
                .unwrap_or(false)
    }

    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{}", self.next_id)
    }

    fn insert(&mut self, name: String, mime_type: String, parent: String, content: Vec<u8>) -> FileMetadata {
        let now = Utc::now();
        let size = if mime_type == FOLDER_MIME_TYPE {
            None
        } else {
            Some(content.len() as u64)
        };
        let metadata = FileMetadata {
            id: self.allocate_id(),
            name,
            mime_type: Some(mime_type),
            web_view_link: None,
            size,
            parents: vec![parent],
            created_time: Some(now),
            modified_time: Some(now),
        };
        self.entities.push(StoredEntity {
            metadata: metadata.clone(),
            content,
            permissions: Vec::new(),
        });
        metadata
    }

    fn descendants(&self, id: &str) -> Vec<String> {
        let mut seen = HashSet::from([id.to_string()]);
        let mut out = Vec::new();
        let mut frontier = vec![id.to_string()];
        while let Some(current) = frontier.pop() {
            for e in &self.entities {
                if e.metadata.parents.iter().any(|p| p == &current)
                    && seen.insert(e.metadata.id.clone())
                {
                    out.push(e.metadata.id.clone());
                    frontier.push(e.metadata.id.clone());
                }
            }
        }
        out
    }
}

fn missing(id: &str) -> DriveError {
    DriveError::ApiError {
        status: 404,
        message: format!("File not found: {}", id),
    }
}

fn matches(metadata: &FileMetadata, clause: &Clause) -> bool {
    let mime = metadata.mime_type.as_deref().unwrap_or_default();
    match clause {
        Clause::NameEq(name) => &metadata.name == name,
        Clause::NameContains(fragment) => metadata.name.contains(fragment.as_str()),
        Clause::InParent(parent) => metadata.parents.iter().any(|p| p == parent),
        Clause::MimeTypeEq(m) => mime == m,
        Clause::MimeTypeNe(m) => mime != m,
        Clause::NotTrashed => true,
    }
}

/// A drive that lives in memory.
#[derive(Default)]
pub struct MemoryDrive {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of remote operations served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of stored entities, root excluded.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Permissions granted on `id`, in grant order.
    pub fn permissions(&self, id: &str) -> Vec<PermissionRequest> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .find(id)
            .map(|e| e.permissions.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteDrive for MemoryDrive {
    fn root_id(&self) -> &str {
        ROOT_ID
    }

    async fn create(&self, entity: NewEntity, _opts: &RequestOptions) -> Result<FileMetadata> {
        let mut state = self.state();
        let parent = entity.parent.unwrap_or_else(|| ROOT_ID.to_string());
        if !state.is_container(&parent) {
            return Err(missing(&parent));
        }
        let mime_type = entity.mime_type.unwrap_or_else(|| {
            mime_guess::from_path(&entity.name)
                .first_or_octet_stream()
                .to_string()
        });
        Ok(state.insert(
            entity.name,
            mime_type,
            parent,
            entity.content.unwrap_or_default(),
        ))
    }

    async fn get(&self, id: &str, _opts: &RequestOptions) -> Result<FileMetadata> {
        if id == ROOT_ID {
            return Ok(FileMetadata {
                id: ROOT_ID.to_string(),
                name: "My Drive".to_string(),
                mime_type: Some(FOLDER_MIME_TYPE.to_string()),
                ..Default::default()
            });
        }
        let state = self.state();
        state.find(id).map(|e| e.metadata.clone())
    }

    async fn get_content(&self, id: &str, _opts: &RequestOptions) -> Result<Vec<u8>> {
        let state = self.state();
        let stored = state.find(id)?;
        if stored.metadata.mime_type.as_deref() == Some(FOLDER_MIME_TYPE) {
            return Err(DriveError::ApiError {
                status: 403,
                message: format!("Only files with binary content can be downloaded: {}", id),
            });
        }
        Ok(stored.content.clone())
    }

    async fn list(
        &self,
        query: &Query,
        limit: Option<usize>,
        _opts: &RequestOptions,
    ) -> Result<Vec<FileMetadata>> {
        let state = self.state();
        let matching = state
            .entities
            .iter()
            .filter(|e| query.clauses().iter().all(|c| matches(&e.metadata, c)))
            .map(|e| e.metadata.clone());
        Ok(match limit {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        })
    }

    async fn update(
        &self,
        id: &str,
        patch: EntityPatch,
        _opts: &RequestOptions,
    ) -> Result<FileMetadata> {
        let mut state = self.state();
        if let Some(parent) = patch.add_parents.iter().find(|p| !state.is_container(p)) {
            return Err(missing(parent));
        }
        if !patch.add_parents.is_empty() {
            let below = state.descendants(id);
            if let Some(parent) = patch
                .add_parents
                .iter()
                .find(|p| p.as_str() == id || below.contains(*p))
            {
                return Err(DriveError::ApiError {
                    status: 400,
                    message: format!("Cannot move {} into itself or its descendant {}", id, parent),
                });
            }
        }
        let stored = state.find_mut(id)?;
        let metadata = &mut stored.metadata;
        if let Some(name) = patch.name {
            metadata.name = name;
        }
        metadata.parents.retain(|p| !patch.remove_parents.contains(p));
        for parent in patch.add_parents {
            if !metadata.parents.contains(&parent) {
                metadata.parents.push(parent);
            }
        }
        metadata.modified_time = Some(Utc::now());
        Ok(metadata.clone())
    }

    async fn delete(&self, id: &str, _opts: &RequestOptions) -> Result<()> {
        let mut state = self.state();
        state.find(id)?;
        let mut doomed = state.descendants(id);
        doomed.push(id.to_string());
        state.entities.retain(|e| !doomed.contains(&e.metadata.id));
        Ok(())
    }

    async fn copy(
        &self,
        id: &str,
        name: &str,
        parent: Option<&str>,
        _opts: &RequestOptions,
    ) -> Result<FileMetadata> {
        let mut state = self.state();
        let (mime_type, content, parents) = {
            let source = state.find(id)?;
            (
                source
                    .metadata
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                source.content.clone(),
                source.metadata.parents.clone(),
            )
        };
        let parent = match parent {
            Some(p) => p.to_string(),
            None => parents.into_iter().next().unwrap_or_else(|| ROOT_ID.to_string()),
        };
        if !state.is_container(&parent) {
            return Err(missing(&parent));
        }
        Ok(state.insert(name.to_string(), mime_type, parent, content))
    }

    async fn create_permission(
        &self,
        id: &str,
        permission: &PermissionRequest,
        _opts: &RequestOptions,
    ) -> Result<Permission> {
        let mut state = self.state();
        let stored = state.find_mut(id)?;
        stored.permissions.push(permission.clone());
        if permission.permission_type == "anyone" {
            stored.metadata.web_view_link =
                Some(format!("https://drive.google.com/file/d/{}/view", id));
        }
        Ok(Permission {
            id: format!("perm-{}", stored.permissions.len()),
            role: Some(permission.role.clone()),
            permission_type: Some(permission.permission_type.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> RequestOptions {
        RequestOptions::default()
    }

    #[tokio::test]
    async fn create_and_list_in_order() {
        let drive = MemoryDrive::new();
        drive.create(NewEntity::file("b.txt", None, b"b".to_vec()), &opts()).await.unwrap();
        drive.create(NewEntity::file("a.txt", None, b"a".to_vec()), &opts()).await.unwrap();

        let all = drive
            .list(&Query::new().in_parent("root"), None, &opts())
            .await
            .unwrap();
        let names: Vec<_> = all.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "a.txt"]);
        assert_eq!(all[0].size, Some(1));
    }

    #[tokio::test]
    async fn create_under_missing_parent_is_404() {
        let drive = MemoryDrive::new();
        let err = drive
            .create(NewEntity::file("x", Some("nope"), vec![]), &opts())
            .await
            .unwrap_err();
        assert!(err.is_remote_not_found());
    }

    #[tokio::test]
    async fn delete_removes_descendants() {
        let drive = MemoryDrive::new();
        let dir = drive.create(NewEntity::folder("d", None), &opts()).await.unwrap();
        drive
            .create(NewEntity::file("f", Some(dir.id.as_str()), vec![1]), &opts())
            .await
            .unwrap();
        assert_eq!(drive.len(), 2);

        drive.delete(&dir.id, &opts()).await.unwrap();
        assert!(drive.is_empty());
        assert!(drive.get(&dir.id, &opts()).await.unwrap_err().is_remote_not_found());
    }

    #[tokio::test]
    async fn update_reparents() {
        let drive = MemoryDrive::new();
        let dir = drive.create(NewEntity::folder("d", None), &opts()).await.unwrap();
        let file = drive
            .create(NewEntity::file("f", None, vec![]), &opts())
            .await
            .unwrap();

        let moved = drive
            .update(&file.id, EntityPatch::reparent(dir.id.clone(), vec!["root".into()]), &opts())
            .await
            .unwrap();
        assert_eq!(moved.parents, vec![dir.id]);
    }

    #[tokio::test]
    async fn update_rejects_parent_cycles() {
        let drive = MemoryDrive::new();
        let outer = drive.create(NewEntity::folder("outer", None), &opts()).await.unwrap();
        let inner = drive
            .create(NewEntity::folder("inner", Some(outer.id.as_str())), &opts())
            .await
            .unwrap();

        for parent in [&outer.id, &inner.id] {
            let err = drive
                .update(&outer.id, EntityPatch::reparent(parent.clone(), vec!["root".into()]), &opts())
                .await
                .unwrap_err();
            assert!(matches!(err, DriveError::ApiError { status: 400, .. }));
        }

        drive.delete(&outer.id, &opts()).await.unwrap();
        assert!(drive.is_empty());
    }

    #[tokio::test]
    async fn folders_have_no_content() {
        let drive = MemoryDrive::new();
        let dir = drive.create(NewEntity::folder("d", None), &opts()).await.unwrap();
        let err = drive.get_content(&dir.id, &opts()).await.unwrap_err();
        assert!(matches!(err, DriveError::ApiError { status: 403, .. }));
    }
}
