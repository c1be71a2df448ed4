//! vdrive - path-addressed access to a cloud drive.
//!
//! The remote service only knows opaque ids and parent links. This library
//! layers virtual paths on top:
//! - Resolve `reports/2024/summary.txt` to an entity, creating missing
//!   folders when writing
//! - Cache name and path lookups in process
//! - Upload, download, copy, move, rename, delete, list, search and share by
//!   name, path or id
//! - Batch uploads and deletes that report per-item results
//!
//! # Example
//!
//! ```no_run
//! use vdrive::{Drive, DriveConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let drive = Drive::from_config(&DriveConfig::from_env()?)?;
//!
//!     let id = drive.upload("reports/2024/summary.txt", "hello", None).await?;
//!     println!("uploaded {}", id);
//!
//!     if let Some(bytes) = drive.download("reports/2024/summary.txt").await? {
//!         println!("{} bytes", bytes.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod drive;
pub mod entity;
pub mod error;
pub mod memory;
pub mod models;
pub mod query;
pub mod remote;
pub mod resolver;
pub mod sanitize;
pub mod url_parser;

// Re-exports for convenience
pub use auth::Authenticator;
pub use cache::IdCache;
pub use client::DriveApiClient;
pub use config::{AuthConfig, DriveConfig};
pub use drive::{BatchItem, Drive, ListFilter, Principal, Role, Target};
pub use entity::{EntityKind, EntityRecord, RemoteEntity, FOLDER_MIME_TYPE};
pub use error::{DriveError, Result};
pub use memory::MemoryDrive;
pub use models::FileMetadata;
pub use remote::{RemoteDrive, RequestOptions};
pub use resolver::PathResolver;
pub use sanitize::sanitize_name;
pub use url_parser::extract_id;
