//! File and folder entities built from remote metadata.
//!
//! A folder is an entity whose MIME type is [`FOLDER_MIME_TYPE`]. The kind is
//! decided once, when the entity is constructed, and read through
//! [`RemoteEntity::is_container`] everywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FileMetadata;

/// MIME type the remote service uses to mark folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Whether an entity holds content or other entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    File,
    Container,
}

impl EntityKind {
    fn from_mime_type(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME_TYPE {
            EntityKind::Container
        } else {
            EntityKind::File
        }
    }
}

/// A file or folder known to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    pub id: String,
    pub name: String,
    /// Virtual path this entity was resolved through, if any.
    pub path: Option<String>,
    pub size: Option<u64>,
    pub mime_type: String,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
    pub parents: Vec<String>,
    pub web_view_link: Option<String>,
    kind: EntityKind,
}

impl RemoteEntity {
    /// Build an entity from a raw remote response.
    pub fn from_metadata(metadata: FileMetadata) -> Self {
        let mime_type = metadata
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let kind = EntityKind::from_mime_type(&mime_type);
        let size = match kind {
            EntityKind::Container => None,
            EntityKind::File => metadata.size,
        };

        Self {
            id: metadata.id,
            name: metadata.name,
            path: None,
            size,
            mime_type,
            created_time: metadata.created_time,
            modified_time: metadata.modified_time,
            parents: metadata.parents,
            web_view_link: metadata.web_view_link,
            kind,
        }
    }

    /// Build a folder entity. The folder MIME type wins over whatever the
    /// metadata carries.
    pub fn container(mut metadata: FileMetadata) -> Self {
        metadata.mime_type = Some(FOLDER_MIME_TYPE.to_string());
        Self::from_metadata(metadata)
    }

    /// Attach the virtual path this entity was reached through.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_container(&self) -> bool {
        self.kind == EntityKind::Container
    }

    /// First parent id, the one move/organize semantics act on.
    pub fn primary_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    /// Extension of a file name, without the dot.
    ///
    /// Containers, names without a dot and dot-files such as `.bashrc` have
    /// no extension.
    pub fn extension(&self) -> Option<&str> {
        if self.is_container() {
            return None;
        }
        split_extension(&self.name).map(|(_, ext)| ext)
    }

    /// Name without its extension.
    pub fn basename(&self) -> &str {
        if self.is_container() {
            return &self.name;
        }
        split_extension(&self.name)
            .map(|(stem, _)| stem)
            .unwrap_or(&self.name)
    }

    /// Flat record handed to callers of list and search.
    pub fn to_record(&self) -> EntityRecord {
        EntityRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            path: self.path.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            created_time: self.created_time,
            modified_time: self.modified_time,
            parents: self.parents.clone(),
            is_container: self.is_container(),
            extension: self.extension().map(str::to_string),
            basename: self.basename().to_string(),
        }
    }
}

fn split_extension(name: &str) -> Option<(&str, &str)> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some((stem, ext))
    }
}

/// Serialized shape of an entity.
///
/// Field names are camelCase in JSON:
/// `id`, `name`, `path`, `size`, `mimeType`, `createdTime`, `modifiedTime`,
/// `parents`, `isContainer`, `extension`, `basename`. Absent optional values
/// serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    pub path: Option<String>,
    pub size: Option<u64>,
    pub mime_type: String,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: Option<DateTime<Utc>>,
    pub parents: Vec<String>,
    pub is_container: bool,
    pub extension: Option<String>,
    pub basename: String,
}

impl std::fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size_str = self
            .size
            .map(crate::models::format_size)
            .unwrap_or_else(|| "-".to_string());
        let name = match &self.path {
            Some(path) => path.as_str(),
            None => self.name.as_str(),
        };
        let suffix = if self.is_container { "/" } else { "" };
        write!(
            f,
            "{:<44} {:>10} {:<30} {}{}",
            self.id, size_str, self.mime_type, name, suffix
        )
    }
}
