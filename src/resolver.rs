//! Virtual path resolution.
//!
//! The remote service only knows ids and parent links. A virtual path such as
//! `reports/2024/summary.txt` is resolved by walking its segments from the root
//! container, asking the service at each level for a child with that name.
//!
//! When several children share a name, the first one the service returns is
//! used. No other ordering is promised; callers that need a specific duplicate
//! must address it by id.

use std::sync::Arc;

use tracing::debug;

use crate::cache::IdCache;
use crate::entity::RemoteEntity;
use crate::error::{DriveError, Result};
use crate::models::FileMetadata;
use crate::query::Query;
use crate::remote::{NewEntity, RemoteDrive, RequestOptions};
use crate::sanitize::sanitize_name;

/// Split a virtual path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Canonical form of a virtual path: segments joined by `/`, no leading,
/// trailing or doubled separators.
pub fn normalize_path(path: &str) -> String {
    split_path(path).join("/")
}

/// Where a write should land, as worked out by
/// [`PathResolver::resolve_parent_for_write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    /// Container that will hold the new entity.
    pub parent_id: String,
    /// Sanitized name for the new entity.
    pub name: String,
    /// Root-anchored virtual path of the new entity, when known.
    pub path: Option<String>,
}

/// Maps virtual paths and bare names to remote entities.
#[derive(Clone)]
pub struct PathResolver {
    remote: Arc<dyn RemoteDrive>,
    cache: Arc<IdCache>,
    root_id: String,
}

impl PathResolver {
    pub fn new(remote: Arc<dyn RemoteDrive>, cache: Arc<IdCache>) -> Self {
        let root_id = remote.root_id().to_string();
        Self {
            remote,
            cache,
            root_id,
        }
    }

    /// Anchor paths at a container other than the service's root.
    pub fn with_root_id(mut self, root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        if root_id != self.root_id {
            // Cached paths are relative to the old anchor.
            self.cache = Arc::new(IdCache::new());
            self.root_id = root_id;
        }
        self
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn cache(&self) -> &IdCache {
        &self.cache
    }

    /// Resolve `path` from the root container.
    pub async fn resolve(&self, path: &str, opts: &RequestOptions) -> Result<Option<RemoteEntity>> {
        self.resolve_from(None, path, opts).await
    }

    /// Resolve `path` starting at `parent`, or at the root when `None`.
    ///
    /// The empty path resolves to the starting container itself. Only
    /// root-anchored paths are cached by path.
    pub async fn resolve_from(
        &self,
        parent: Option<&str>,
        path: &str,
        opts: &RequestOptions,
    ) -> Result<Option<RemoteEntity>> {
        let anchored = parent.map_or(true, |p| p == self.root_id);
        let base = parent.unwrap_or(&self.root_id);
        let segments = split_path(path);

        let Some((leaf, dirs)) = segments.split_last() else {
            return self.get_by_id(base, opts).await;
        };

        let normalized = segments.join("/");
        if anchored {
            if let Some(hit) = self.cache.get_path(&normalized) {
                debug!(path = %normalized, id = %hit.id, "path cache hit");
                return Ok(Some(hit));
            }
        }

        let mut current = base.to_string();
        for (depth, segment) in dirs.iter().enumerate() {
            let prefix = segments[..=depth].join("/");
            if anchored {
                if let Some(hit) = self.cache.get_path(&prefix).filter(|e| e.is_container()) {
                    current = hit.id;
                    continue;
                }
            }
            match self.find_child(&current, segment, true, opts).await? {
                Some(folder) => {
                    let folder = RemoteEntity::container(folder);
                    if anchored {
                        self.cache.insert_path(&prefix, folder.clone().with_path(prefix.clone()));
                    }
                    current = folder.id;
                }
                None => {
                    debug!(path = %normalized, missing = %segment, "path does not resolve");
                    return Ok(None);
                }
            }
        }

        let Some(found) = self.find_child(&current, leaf, false, opts).await? else {
            debug!(path = %normalized, missing = %leaf, "path does not resolve");
            return Ok(None);
        };

        let mut entity = RemoteEntity::from_metadata(found);
        if anchored {
            entity = entity.with_path(normalized);
        }
        self.cache.remember(&entity);
        Ok(Some(entity))
    }

    /// Walk `path` in write mode: every segment but the last is found or
    /// created under its sanitized name.
    pub async fn resolve_parent_for_write(
        &self,
        path: &str,
        parent: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<WriteTarget> {
        let segments = split_path(path);
        let Some((leaf, dirs)) = segments.split_last() else {
            return Err(DriveError::InvalidInput(format!(
                "path {:?} has no name component",
                path
            )));
        };
        let dirs: Vec<String> = dirs.iter().map(|s| sanitize_name(s)).collect();
        let name = sanitize_name(leaf);

        let anchored = parent.map_or(true, |p| p == self.root_id);
        let mut current = parent.unwrap_or(&self.root_id).to_string();

        for (depth, dir) in dirs.iter().enumerate() {
            let prefix = dirs[..=depth].join("/");
            if anchored {
                if let Some(hit) = self.cache.get_path(&prefix).filter(|e| e.is_container()) {
                    current = hit.id;
                    continue;
                }
            }
            let folder = self.ensure_container_entity(&current, dir, opts).await?;
            if anchored {
                self.cache.insert_path(&prefix, folder.clone().with_path(prefix.clone()));
            }
            current = folder.id;
        }

        let path = anchored.then(|| {
            let mut full = dirs;
            full.push(name.clone());
            full.join("/")
        });

        Ok(WriteTarget {
            parent_id: current,
            name,
            path,
        })
    }

    /// Id of a container named `name` under `parent_id`, created if absent.
    ///
    /// Lookup and creation are separate remote calls. Two callers racing on
    /// the same missing name can both create it, leaving duplicates behind.
    pub async fn ensure_container(
        &self,
        parent_id: &str,
        name: &str,
        opts: &RequestOptions,
    ) -> Result<String> {
        Ok(self.ensure_container_entity(parent_id, name, opts).await?.id)
    }

    async fn ensure_container_entity(
        &self,
        parent_id: &str,
        name: &str,
        opts: &RequestOptions,
    ) -> Result<RemoteEntity> {
        let name = sanitize_name(name);
        if let Some(existing) = self.find_child(parent_id, &name, true, opts).await? {
            return Ok(RemoteEntity::container(existing));
        }

        debug!(parent = %parent_id, name = %name, "creating missing container");
        let created = self
            .remote
            .create(NewEntity::folder(name, Some(parent_id)), opts)
            .await?;
        Ok(RemoteEntity::container(created))
    }

    /// Any entity named exactly `name`, wherever it lives.
    pub async fn find_by_name_flat(
        &self,
        name: &str,
        opts: &RequestOptions,
    ) -> Result<Option<RemoteEntity>> {
        if let Some(hit) = self.cache.get_name(name) {
            debug!(name = %name, id = %hit.id, "name cache hit");
            return Ok(Some(hit));
        }

        let query = Query::new().name_eq(name).not_trashed();
        let found = self.remote.list(&query, Some(1), opts).await?;
        Ok(found.into_iter().next().map(|metadata| {
            let entity = RemoteEntity::from_metadata(metadata);
            self.cache.remember(&entity);
            entity
        }))
    }

    /// Fetch an entity by id; a 404 becomes `None`.
    pub async fn get_by_id(&self, id: &str, opts: &RequestOptions) -> Result<Option<RemoteEntity>> {
        match self.remote.get(id, opts).await {
            Ok(metadata) => Ok(Some(RemoteEntity::from_metadata(metadata))),
            Err(e) if e.is_remote_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Record an entity the caller just created or changed.
    pub fn remember(&self, entity: &RemoteEntity) {
        self.cache.remember(entity);
    }

    /// Drop every cached alias of `id`.
    pub fn forget(&self, id: &str) {
        let removed = self.cache.evict_id(id);
        debug!(id = %id, removed, "evicted cache entries");
    }

    /// Drop the whole cache. Used when a container changes, since every path
    /// below it may now be wrong.
    pub fn forget_all(&self) {
        self.cache.clear();
    }

    async fn find_child(
        &self,
        parent_id: &str,
        name: &str,
        containers_only: bool,
        opts: &RequestOptions,
    ) -> Result<Option<FileMetadata>> {
        let mut query = Query::new().name_eq(name).in_parent(parent_id).not_trashed();
        if containers_only {
            query = query.folders_only();
        }
        let found = self.remote.list(&query, Some(1), opts).await?;
        Ok(found.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDrive;

    fn resolver() -> (Arc<MemoryDrive>, PathResolver) {
        let remote = Arc::new(MemoryDrive::new());
        let resolver = PathResolver::new(remote.clone(), Arc::new(IdCache::new()));
        (remote, resolver)
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("/a//b/c.txt/"), "a/b/c.txt");
        assert_eq!(normalize_path(""), "");
        assert_eq!(split_path("a/b"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn write_walk_creates_missing_containers_once() {
        let (remote, resolver) = resolver();
        let opts = RequestOptions::default();

        let target = resolver
            .resolve_parent_for_write("a/b/c.txt", None, &opts)
            .await
            .unwrap();
        assert_eq!(target.name, "c.txt");
        assert_eq!(target.path.as_deref(), Some("a/b/c.txt"));
        assert_eq!(remote.len(), 2);

        let again = resolver
            .resolve_parent_for_write("a/b/d.txt", None, &opts)
            .await
            .unwrap();
        assert_eq!(target.parent_id, again.parent_id);
        assert_eq!(remote.len(), 2);
    }

    #[tokio::test]
    async fn write_walk_sanitizes_segments() {
        let (_, resolver) = resolver();
        let opts = RequestOptions::default();
        let target = resolver
            .resolve_parent_for_write("q:1/r*.txt", None, &opts)
            .await
            .unwrap();
        assert_eq!(target.name, "r_.txt");
        assert_eq!(target.path.as_deref(), Some("q_1/r_.txt"));
        let folder = resolver.resolve("q_1", &opts).await.unwrap().unwrap();
        assert_eq!(folder.id, target.parent_id);
    }

    #[tokio::test]
    async fn parent_relative_writes_have_no_path() {
        let (remote, resolver) = resolver();
        let opts = RequestOptions::default();
        let dir = remote.create(NewEntity::folder("base", None), &opts).await.unwrap();
        let target = resolver
            .resolve_parent_for_write("inner/x.txt", Some(dir.id.as_str()), &opts)
            .await
            .unwrap();
        assert_eq!(target.path, None);
        assert_ne!(target.parent_id, dir.id);
    }

    #[tokio::test]
    async fn ensure_container_reuses_existing() {
        let (remote, resolver) = resolver();
        let opts = RequestOptions::default();
        let first = resolver.ensure_container("root", "docs", &opts).await.unwrap();
        let second = resolver.ensure_container("root", "docs", &opts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test]
    async fn files_do_not_act_as_intermediate_containers() {
        let (remote, resolver) = resolver();
        let opts = RequestOptions::default();
        remote
            .create(NewEntity::file("a", None, b"x".to_vec()), &opts)
            .await
            .unwrap();

        assert!(resolver.resolve("a/b", &opts).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_path_is_root() {
        let (_, resolver) = resolver();
        let root = resolver
            .resolve("", &RequestOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.id, "root");
        assert!(root.is_container());
    }

    #[tokio::test]
    async fn write_walk_rejects_empty_path() {
        let (_, resolver) = resolver();
        let err = resolver
            .resolve_parent_for_write("//", None, &RequestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::InvalidInput(_)));
    }
}
