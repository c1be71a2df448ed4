//! The boundary with the remote storage service.
//!
//! Everything above this trait (resolver, facade) is written against
//! [`RemoteDrive`]; [`crate::client::DriveApiClient`] talks to the real API and
//! [`crate::memory::MemoryDrive`] keeps everything in process.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::models::{FileMetadata, Permission, PermissionRequest};
use crate::query::Query;

/// Per-call transport options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Upper bound for each remote request issued on behalf of the call.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// A create request: metadata plus optional content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEntity {
    pub name: String,
    pub mime_type: Option<String>,
    pub parent: Option<String>,
    pub content: Option<Vec<u8>>,
}

impl NewEntity {
    pub fn folder(name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            name: name.into(),
            mime_type: Some(crate::entity::FOLDER_MIME_TYPE.to_string()),
            parent: parent.map(str::to_string),
            content: None,
        }
    }

    pub fn file(name: impl Into<String>, parent: Option<&str>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            parent: parent.map(str::to_string),
            content: Some(content),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Metadata update: rename and/or reparent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityPatch {
    pub name: Option<String>,
    pub add_parents: Vec<String>,
    pub remove_parents: Vec<String>,
}

impl EntityPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn reparent(add: impl Into<String>, remove: Vec<String>) -> Self {
        Self {
            name: None,
            add_parents: vec![add.into()],
            remove_parents: remove,
        }
    }
}

/// Operations consumed from the remote storage service.
///
/// Implementations report a missing object from `get`, `get_content`,
/// `update`, `delete`, `copy` and `create_permission` as
/// [`crate::DriveError::ApiError`] with status 404.
#[async_trait]
pub trait RemoteDrive: Send + Sync {
    /// Id of the container that anchors every virtual path.
    fn root_id(&self) -> &str;

    async fn create(&self, entity: NewEntity, opts: &RequestOptions) -> Result<FileMetadata>;

    async fn get(&self, id: &str, opts: &RequestOptions) -> Result<FileMetadata>;

    async fn get_content(&self, id: &str, opts: &RequestOptions) -> Result<Vec<u8>>;

    /// Write the content of `id` into `sink`, returning the byte count.
    async fn get_content_to(
        &self,
        id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        opts: &RequestOptions,
    ) -> Result<u64> {
        let content = self.get_content(id, opts).await?;
        sink.write_all(&content).await?;
        sink.flush().await?;
        Ok(content.len() as u64)
    }

    /// Entities matching `query`, in the order the service returns them.
    async fn list(
        &self,
        query: &Query,
        limit: Option<usize>,
        opts: &RequestOptions,
    ) -> Result<Vec<FileMetadata>>;

    async fn update(&self, id: &str, patch: EntityPatch, opts: &RequestOptions)
        -> Result<FileMetadata>;

    async fn delete(&self, id: &str, opts: &RequestOptions) -> Result<()>;

    async fn copy(
        &self,
        id: &str,
        name: &str,
        parent: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<FileMetadata>;

    async fn create_permission(
        &self,
        id: &str,
        permission: &PermissionRequest,
        opts: &RequestOptions,
    ) -> Result<Permission>;
}
