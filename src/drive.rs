//! The public drive facade.
//!
//! [`Drive`] is the context object every operation goes through. It owns the
//! shared remote handle, the path resolver and the lookup cache; nothing is
//! global. Build one with [`Drive::new`] (any [`RemoteDrive`]) or
//! [`Drive::from_config`] (the Drive REST API).
//!
//! Entities are addressed with a [`Target`]:
//! * a bare name such as `"c.txt"` is looked up anywhere in the drive;
//! * anything containing `/`, such as `"a/b/c.txt"` or `"/c.txt"`, is walked
//!   as a virtual path from the root container;
//! * [`Target::Id`] (or a Drive URL passed to [`Target::parse`]) skips lookup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::IdCache;
use crate::client::DriveApiClient;
use crate::config::DriveConfig;
use crate::entity::{EntityRecord, RemoteEntity};
use crate::error::{DriveError, Result};
use crate::models::PermissionRequest;
use crate::query::Query;
use crate::remote::{EntityPatch, NewEntity, RemoteDrive, RequestOptions};
use crate::resolver::{normalize_path, split_path, PathResolver};
use crate::sanitize::sanitize_name;
use crate::url_parser::parse_drive_url;

/// How an operation addresses an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A bare name or a virtual path.
    Path(String),
    /// A remote id.
    Id(String),
}

impl Target {
    pub fn path(path: impl Into<String>) -> Self {
        Target::Path(path.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Target::Id(id.into())
    }

    /// Drive URLs become ids; everything else is a name or path.
    pub fn parse(input: &str) -> Self {
        match parse_drive_url(input) {
            Some(id) => Target::Id(id),
            None => Target::Path(input.to_string()),
        }
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::Path(value.to_string())
    }
}

impl From<String> for Target {
    fn from(value: String) -> Self {
        Target::Path(value)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Path(path) => f.write_str(path),
            Target::Id(id) => write!(f, "id:{}", id),
        }
    }
}

/// Which kinds of entities a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFilter {
    #[default]
    All,
    FilesOnly,
    ContainersOnly,
}

/// Access level granted by [`Drive::share`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reader,
    Commenter,
    Writer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Commenter => "commenter",
            Role::Writer => "writer",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DriveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "commenter" => Ok(Role::Commenter),
            "writer" => Ok(Role::Writer),
            other => Err(DriveError::InvalidInput(format!("unknown role {:?}", other))),
        }
    }
}

/// Who a permission is granted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(String),
    Group(String),
    Domain(String),
    Anyone,
}

impl Principal {
    /// `anyone`, or an e-mail address for a user.
    pub fn parse(input: &str) -> Self {
        if input.eq_ignore_ascii_case("anyone") {
            Principal::Anyone
        } else {
            Principal::User(input.to_string())
        }
    }

    fn permission(&self, role: Role) -> PermissionRequest {
        let (permission_type, email_address, domain) = match self {
            Principal::User(email) => ("user", Some(email.clone()), None),
            Principal::Group(email) => ("group", Some(email.clone()), None),
            Principal::Domain(domain) => ("domain", None, Some(domain.clone())),
            Principal::Anyone => ("anyone", None, None),
        };
        PermissionRequest {
            role: role.as_str().to_string(),
            permission_type: permission_type.to_string(),
            email_address,
            domain,
        }
    }
}

/// Outcome of one item of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    fn ok(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            id: Some(id.into()),
            error: None,
        }
    }

    fn failed(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            success: false,
            id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Drive operations by name, path or id.
#[derive(Clone)]
pub struct Drive {
    remote: Arc<dyn RemoteDrive>,
    resolver: PathResolver,
    opts: RequestOptions,
}

impl Drive {
    /// Build a facade over `remote` with a fresh cache.
    pub fn new(remote: Arc<dyn RemoteDrive>) -> Self {
        let resolver = PathResolver::new(remote.clone(), Arc::new(IdCache::new()));
        Self {
            remote,
            resolver,
            opts: RequestOptions::default(),
        }
    }

    /// Build a facade over the Drive REST API.
    pub fn from_config(config: &DriveConfig) -> Result<Self> {
        let client = DriveApiClient::new(config.authenticator()?)
            .with_root_id(config.root_id.clone())
            .with_default_timeout(config.timeout);
        Ok(Self::new(Arc::new(client)))
    }

    /// Anchor virtual paths at `root_id` instead of the service's root.
    ///
    /// The returned handle starts with its own empty cache.
    pub fn with_root_id(mut self, root_id: impl Into<String>) -> Self {
        self.resolver = self.resolver.with_root_id(root_id);
        self
    }

    /// A handle sharing this drive's client and cache whose remote calls
    /// are each bounded by `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Drive {
        let mut drive = self.clone();
        drive.opts = RequestOptions::with_timeout(timeout);
        drive
    }

    /// The shared remote handle, for callers that need operations the
    /// facade does not cover.
    pub fn remote(&self) -> &Arc<dyn RemoteDrive> {
        &self.remote
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &IdCache {
        self.resolver.cache()
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.opts
    }

    // ── Lookup ───────────────────────────────────────────────────

    async fn locate(&self, target: &Target) -> Result<Option<RemoteEntity>> {
        match target {
            Target::Id(id) => self.resolver.get_by_id(id, &self.opts).await,
            Target::Path(path) if path.contains('/') => {
                self.resolver.resolve(path, &self.opts).await
            }
            Target::Path(name) => self.resolver.find_by_name_flat(name, &self.opts).await,
        }
    }

    async fn require(&self, operation: &'static str, target: &Target) -> Result<RemoteEntity> {
        self.locate(target)
            .await
            .map_err(|e| e.context(operation, target.to_string()))?
            .ok_or_else(|| DriveError::not_found(operation, target.to_string()))
    }

    /// Forget cached aliases after `entity` changed or disappeared.
    fn invalidate(&self, entity: &RemoteEntity) {
        if entity.is_container() {
            self.resolver.forget_all();
        } else {
            self.resolver.forget(&entity.id);
        }
    }

    /// The entity behind `target`, if any.
    pub async fn stat(&self, target: impl Into<Target>) -> Result<Option<RemoteEntity>> {
        let target = target.into();
        self.locate(&target)
            .await
            .map_err(|e| e.context("stat", target.to_string()))
    }

    pub async fn exists(&self, target: impl Into<Target>) -> Result<bool> {
        let target = target.into();
        Ok(self
            .locate(&target)
            .await
            .map_err(|e| e.context("exists", target.to_string()))?
            .is_some())
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Store `content` at `path`, creating missing folders along the way.
    /// With `parent`, the path is taken relative to that container id.
    ///
    /// A new entity is created even when one with the same name exists.
    pub async fn upload(
        &self,
        path: &str,
        content: impl Into<Vec<u8>>,
        parent: Option<&str>,
    ) -> Result<String> {
        self.upload_with_mime(path, content.into(), None, parent)
            .await
            .map_err(|e| e.context("upload", path))
    }

    /// Upload a local file under its own name.
    pub async fn upload_file(&self, local_path: impl AsRef<Path>, parent: Option<&str>) -> Result<String> {
        let local_path = local_path.as_ref();
        if !local_path.is_file() {
            return Err(DriveError::InvalidInput(format!(
                "{} is not a readable file",
                local_path.display()
            )));
        }
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DriveError::InvalidInput(format!("{} has no usable file name", local_path.display()))
            })?
            .to_string();

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| DriveError::from(e).context("upload", local_path.display().to_string()))?;
        let mime_type = mime_guess::from_path(local_path)
            .first_or_octet_stream()
            .to_string();

        self.upload_with_mime(&name, content, Some(mime_type), parent)
            .await
            .map_err(|e| e.context("upload", local_path.display().to_string()))
    }

    async fn upload_with_mime(
        &self,
        path: &str,
        content: Vec<u8>,
        mime_type: Option<String>,
        parent: Option<&str>,
    ) -> Result<String> {
        if split_path(path).is_empty() {
            return Err(DriveError::InvalidInput("upload needs a non-empty name".into()));
        }

        let target = self
            .resolver
            .resolve_parent_for_write(path, parent, &self.opts)
            .await?;

        let mut request = NewEntity::file(target.name, Some(target.parent_id.as_str()), content);
        if let Some(mime_type) = mime_type {
            request = request.with_mime_type(mime_type);
        }
        let created = self.remote.create(request, &self.opts).await?;

        let mut entity = RemoteEntity::from_metadata(created);
        if let Some(path) = target.path {
            entity = entity.with_path(path);
        }
        info!(id = %entity.id, name = %entity.name, "uploaded");
        self.resolver.remember(&entity);
        Ok(entity.id)
    }

    /// Create a folder at `path`. Missing intermediate folders are created;
    /// the last segment is always created, even if a folder with that name
    /// already exists there.
    pub async fn make_dir(&self, path: &str, parent: Option<&str>) -> Result<String> {
        let target = self
            .resolver
            .resolve_parent_for_write(path, parent, &self.opts)
            .await
            .map_err(|e| e.context("make_dir", path))?;

        let created = self
            .remote
            .create(NewEntity::folder(target.name, Some(target.parent_id.as_str())), &self.opts)
            .await
            .map_err(|e| e.context("make_dir", path))?;

        let mut entity = RemoteEntity::container(created);
        if let Some(path) = target.path {
            entity = entity.with_path(path);
        }
        info!(id = %entity.id, name = %entity.name, "created folder");
        self.resolver.remember(&entity);
        Ok(entity.id)
    }

    /// Copy `src` as `dst_name` into `parent` (or next to the source).
    pub async fn copy(
        &self,
        src: impl Into<Target>,
        dst_name: &str,
        parent: Option<&str>,
    ) -> Result<String> {
        let src = src.into();
        let source = self.require("copy", &src).await?;
        let name = sanitize_name(dst_name);

        let created = self
            .remote
            .copy(&source.id, &name, parent, &self.opts)
            .await
            .map_err(|e| e.context("copy", src.to_string()))?;

        let entity = RemoteEntity::from_metadata(created);
        info!(from = %source.id, id = %entity.id, name = %entity.name, "copied");
        self.resolver.remember(&entity);
        Ok(entity.id)
    }

    /// Make `parent_id` the only parent of `target`.
    pub async fn move_to(&self, target: impl Into<Target>, parent_id: &str) -> Result<bool> {
        let target = target.into();
        let entity = self.require("move", &target).await?;

        let remove = entity
            .parents
            .iter()
            .filter(|p| p.as_str() != parent_id)
            .cloned()
            .collect();
        self.remote
            .update(&entity.id, EntityPatch::reparent(parent_id, remove), &self.opts)
            .await
            .map_err(|e| e.context("move", target.to_string()))?;

        info!(id = %entity.id, parent = %parent_id, "moved");
        self.invalidate(&entity);
        Ok(true)
    }

    pub async fn rename(&self, target: impl Into<Target>, new_name: &str) -> Result<bool> {
        let target = target.into();
        let entity = self.require("rename", &target).await?;
        let name = sanitize_name(new_name);

        let updated = self
            .remote
            .update(&entity.id, EntityPatch::rename(name), &self.opts)
            .await
            .map_err(|e| e.context("rename", target.to_string()))?;

        self.invalidate(&entity);
        let mut renamed = RemoteEntity::from_metadata(updated);
        if let Some(old_path) = &entity.path {
            let new_path = match old_path.rsplit_once('/') {
                Some((dir, _)) => format!("{}/{}", dir, renamed.name),
                None => renamed.name.clone(),
            };
            renamed = renamed.with_path(new_path);
        }
        info!(id = %renamed.id, from = %entity.name, to = %renamed.name, "renamed");
        self.resolver.remember(&renamed);
        Ok(true)
    }

    /// Delete `target`. Returns `false` when there was nothing to delete.
    pub async fn delete(&self, target: impl Into<Target>) -> Result<bool> {
        let target = target.into();
        let Some(entity) = self
            .locate(&target)
            .await
            .map_err(|e| e.context("delete", target.to_string()))?
        else {
            return Ok(false);
        };

        match self.remote.delete(&entity.id, &self.opts).await {
            Ok(()) => {
                info!(id = %entity.id, name = %entity.name, "deleted");
                self.invalidate(&entity);
                Ok(true)
            }
            Err(e) if e.is_remote_not_found() => {
                debug!(id = %entity.id, "already gone remotely");
                self.invalidate(&entity);
                Ok(false)
            }
            Err(e) => Err(e.context("delete", target.to_string())),
        }
    }

    /// Delete by id. Unlike [`Drive::delete`], a missing id is an error.
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        match self.remote.delete(id, &self.opts).await {
            Ok(()) => {
                info!(id = %id, "deleted");
                // The kind is unknown here, so nothing cached can be trusted.
                self.resolver.forget_all();
                Ok(())
            }
            Err(e) if e.is_remote_not_found() => {
                self.resolver.forget(id);
                Err(DriveError::not_found("delete", id))
            }
            Err(e) => Err(e.context("delete", id)),
        }
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Content of `target`, or `None` when it does not exist.
    pub async fn download(&self, target: impl Into<Target>) -> Result<Option<Vec<u8>>> {
        let target = target.into();
        let Some(entity) = self.downloadable(&target).await? else {
            return Ok(None);
        };

        match self.remote.get_content(&entity.id, &self.opts).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_remote_not_found() => {
                self.resolver.forget(&entity.id);
                Ok(None)
            }
            Err(e) => Err(e.context("download", target.to_string())),
        }
    }

    /// Stream `target` into the file at `destination`. A directory
    /// destination receives a file named after the entity. Returns the
    /// written path, or `None` when the target does not exist.
    pub async fn download_to_file(
        &self,
        target: impl Into<Target>,
        destination: impl AsRef<Path>,
    ) -> Result<Option<PathBuf>> {
        let target = target.into();
        let Some(entity) = self.downloadable(&target).await? else {
            return Ok(None);
        };

        let destination = destination.as_ref();
        let final_path = if destination.is_dir() {
            destination.join(sanitize_name(&entity.name))
        } else {
            destination.to_path_buf()
        };

        self.write_content(&entity.id, &final_path)
            .await
            .map_err(|e| e.context("download", target.to_string()))?;
        Ok(Some(final_path))
    }

    async fn downloadable(&self, target: &Target) -> Result<Option<RemoteEntity>> {
        let entity = self
            .locate(target)
            .await
            .map_err(|e| e.context("download", target.to_string()))?;
        match entity {
            Some(e) if e.is_container() => Err(DriveError::InvalidInput(format!(
                "{} is a folder and has no content",
                target
            ))),
            other => Ok(other),
        }
    }

    async fn write_content(&self, id: &str, path: &Path) -> Result<u64> {
        let mut file = tokio::fs::File::create(path).await?;
        self.remote.get_content_to(id, &mut file, &self.opts).await
    }

    /// Entities directly inside `parent` (the root when `None`), in the
    /// order the service lists them.
    pub async fn list(
        &self,
        parent: Option<Target>,
        limit: Option<usize>,
        filter: ListFilter,
    ) -> Result<Vec<EntityRecord>> {
        let folder = match &parent {
            None => self.resolver.root_id().to_string(),
            Some(target) => {
                let entity = self.require("list", target).await?;
                if !entity.is_container() {
                    return Err(DriveError::InvalidInput(format!("{} is not a folder", target)));
                }
                entity.id
            }
        };
        let base_path = match &parent {
            None => Some(String::new()),
            Some(Target::Path(p)) if p.contains('/') => Some(normalize_path(p)),
            Some(_) => None,
        };

        let mut query = Query::new().in_parent(&folder).not_trashed();
        query = match filter {
            ListFilter::All => query,
            ListFilter::FilesOnly => query.exclude_folders(),
            ListFilter::ContainersOnly => query.folders_only(),
        };

        let found = self
            .remote
            .list(&query, limit, &self.opts)
            .await
            .map_err(|e| e.context("list", folder.clone()))?;

        Ok(found
            .into_iter()
            .map(|metadata| {
                let entity = RemoteEntity::from_metadata(metadata);
                let entity = match &base_path {
                    Some(base) if base.is_empty() => {
                        let name = entity.name.clone();
                        entity.with_path(name)
                    }
                    Some(base) => {
                        let path = format!("{}/{}", base, entity.name);
                        entity.with_path(path)
                    }
                    None => entity,
                };
                entity.to_record()
            })
            .collect())
    }

    /// Entities whose name contains `fragment`, in the order the service
    /// returns them.
    pub async fn search(&self, fragment: &str, limit: Option<usize>) -> Result<Vec<EntityRecord>> {
        let query = Query::new().name_contains(fragment).not_trashed();
        let found = self
            .remote
            .list(&query, limit, &self.opts)
            .await
            .map_err(|e| e.context("search", fragment))?;
        Ok(found
            .into_iter()
            .map(|m| RemoteEntity::from_metadata(m).to_record())
            .collect())
    }

    // ── Sharing ──────────────────────────────────────────────────

    pub async fn share(
        &self,
        target: impl Into<Target>,
        principal: Principal,
        role: Role,
    ) -> Result<bool> {
        let target = target.into();
        let entity = self.require("share", &target).await?;
        self.remote
            .create_permission(&entity.id, &principal.permission(role), &self.opts)
            .await
            .map_err(|e| e.context("share", target.to_string()))?;
        info!(id = %entity.id, role = role.as_str(), "shared");
        Ok(true)
    }

    /// Let anyone with the link read `target` and return that link.
    pub async fn public_link(&self, target: impl Into<Target>) -> Result<Option<String>> {
        let target = target.into();
        let entity = self.require("public_link", &target).await?;
        self.remote
            .create_permission(&entity.id, &Principal::Anyone.permission(Role::Reader), &self.opts)
            .await
            .map_err(|e| e.context("public_link", target.to_string()))?;
        let refreshed = self
            .remote
            .get(&entity.id, &self.opts)
            .await
            .map_err(|e| e.context("public_link", target.to_string()))?;
        Ok(refreshed.web_view_link)
    }

    // ── Batches ──────────────────────────────────────────────────

    /// Upload every `(path, content)` pair. One record per item; a failing
    /// item never stops the rest.
    pub async fn batch_upload<I, N, C>(&self, items: I) -> Vec<BatchItem>
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<Vec<u8>>,
    {
        let mut results = Vec::new();
        for (name, content) in items {
            let name = name.into();
            let item = match self.upload(&name, content, None).await {
                Ok(id) => BatchItem::ok(name, id),
                Err(e) => {
                    warn!(name = %name, error = %e, "batch upload item failed");
                    BatchItem::failed(name, e)
                }
            };
            results.push(item);
        }
        results
    }

    /// Delete every name. A name that does not resolve is reported as an
    /// unsuccessful item.
    pub async fn batch_delete<I, S>(&self, names: I) -> Vec<BatchItem>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut results = Vec::new();
        for name in names {
            let name = name.into();
            let item = match self.locate_and_delete(&name).await {
                Ok(id) => BatchItem::ok(name, id),
                Err(e) => {
                    warn!(name = %name, error = %e, "batch delete item failed");
                    BatchItem::failed(name, e)
                }
            };
            results.push(item);
        }
        results
    }

    async fn locate_and_delete(&self, name: &str) -> Result<String> {
        let target = Target::path(name);
        let entity = self.require("delete", &target).await?;
        self.delete(Target::id(entity.id.clone())).await?;
        Ok(entity.id)
    }

    /// Copy every file directly inside `folder` (root when `None`) into
    /// `local_dir`, named after the remote entity.
    pub async fn backup(
        &self,
        folder: Option<Target>,
        local_dir: impl AsRef<Path>,
    ) -> Result<Vec<BatchItem>> {
        let local_dir = local_dir.as_ref();
        tokio::fs::create_dir_all(local_dir)
            .await
            .map_err(|e| DriveError::from(e).context("backup", local_dir.display().to_string()))?;

        let files = self.list(folder, None, ListFilter::FilesOnly).await?;
        let mut results = Vec::with_capacity(files.len());
        for record in files {
            let destination = local_dir.join(sanitize_name(&record.name));
            let item = match self.write_content(&record.id, &destination).await {
                Ok(bytes) => {
                    debug!(name = %record.name, bytes, "backed up");
                    BatchItem::ok(record.name, record.id)
                }
                Err(e) => {
                    let e = e.context("backup", record.name.clone());
                    warn!(name = %record.name, error = %e, "backup item failed");
                    BatchItem::failed(record.name, e)
                }
            };
            results.push(item);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parse_recognizes_urls() {
        assert_eq!(
            Target::parse("https://drive.google.com/file/d/abc123/view"),
            Target::Id("abc123".into())
        );
        assert_eq!(Target::parse("reports/a.txt"), Target::Path("reports/a.txt".into()));
        assert_eq!(Target::parse("abc123"), Target::Path("abc123".into()));
    }

    #[test]
    fn principal_permissions() {
        let p = Principal::parse("bob@example.com").permission(Role::Writer);
        assert_eq!(p.permission_type, "user");
        assert_eq!(p.email_address.as_deref(), Some("bob@example.com"));
        assert_eq!(p.role, "writer");

        let anyone = Principal::parse("Anyone").permission(Role::Reader);
        assert_eq!(anyone.permission_type, "anyone");
        assert!(anyone.email_address.is_none());

        let domain = Principal::Domain("example.com".into()).permission(Role::Commenter);
        assert_eq!(domain.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn role_from_str() {
        assert_eq!("Writer".parse::<Role>().unwrap(), Role::Writer);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn batch_item_serializes_success_or_error() {
        let ok = serde_json::to_value(BatchItem::ok("a.txt", "id1")).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["id"], "id1");
        assert!(ok.get("error").is_none());

        let failed = serde_json::to_value(BatchItem::failed("b.txt", "boom")).unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["error"], "boom");
        assert!(failed.get("id").is_none());
    }
}
