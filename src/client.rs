//! Google Drive API v3 client.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::models::{
    ApiErrorResponse, FileListResponse, FileMetadata, Permission, PermissionRequest, FILE_FIELDS,
};
use crate::query::Query;
use crate::remote::{EntityPatch, NewEntity, RemoteDrive, RequestOptions};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload URL for Google Drive API.
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Threshold for resumable upload (500 MB).
const RESUMABLE_THRESHOLD: usize = 500 * 1024 * 1024;

/// Largest page the files.list endpoint hands out.
const MAX_PAGE_SIZE: usize = 1000;

/// Client for the Drive REST API.
pub struct DriveApiClient {
    auth: Authenticator,
    http: Client,
    api_base: String,
    upload_base: String,
    drive_id: Option<String>,
    root_id: String,
    default_timeout: Option<Duration>,
}

impl DriveApiClient {
    /// Create a client for the user's own drive.
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
            drive_id: None,
            root_id: "root".to_string(),
            default_timeout: None,
        }
    }

    /// Scope every listing to a Shared Drive, whose id is also its root folder.
    pub fn with_shared_drive(mut self, drive_id: impl Into<String>) -> Self {
        let drive_id = drive_id.into();
        self.root_id = drive_id.clone();
        self.drive_id = Some(drive_id);
        self
    }

    pub fn with_root_id(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = root_id.into();
        self
    }

    /// Timeout used when a call does not carry its own.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Send requests somewhere other than googleapis.com.
    pub fn with_base_urls(
        mut self,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    pub fn drive_id(&self) -> Option<&str> {
        self.drive_id.as_deref()
    }

    fn files_url(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("{}/files", self.api_base)
        } else {
            format!("{}/files/{}", self.api_base, suffix)
        }
    }

    /// Authorize `builder` and apply the call's timeout.
    async fn prepare(
        &self,
        builder: RequestBuilder,
        opts: &RequestOptions,
    ) -> Result<RequestBuilder> {
        let token = self.auth.get_access_token().await?;
        let builder = builder.bearer_auth(token);
        Ok(match opts.timeout.or(self.default_timeout) {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        })
    }

    /// Turn a non-success response into an `ApiError`.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
            return Err(DriveError::ApiError {
                status: api_error.error.code,
                message: api_error.error.message,
            });
        }
        Err(DriveError::ApiError {
            status: status.as_u16(),
            message: error_body,
        })
    }

    /// Query files using Google Drive query syntax, following pagination
    /// until `limit` results are collected.
    pub async fn query_files(
        &self,
        query: &str,
        limit: Option<usize>,
        opts: &RequestOptions,
    ) -> Result<Vec<FileMetadata>> {
        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);

        loop {
            let page_size = limit
                .map(|l| l.saturating_sub(all_files.len()).clamp(1, MAX_PAGE_SIZE))
                .unwrap_or(MAX_PAGE_SIZE)
                .to_string();

            let mut request = self.http.get(self.files_url("")).query(&[
                ("q", query),
                ("pageSize", page_size.as_str()),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
                ("spaces", "drive"),
                ("fields", fields.as_str()),
            ]);

            request = match &self.drive_id {
                Some(drive_id) => {
                    request.query(&[("driveId", drive_id.as_str()), ("corpora", "drive")])
                }
                None => request.query(&[("corpora", "user")]),
            };

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self.prepare(request, opts).await?.send().await?;
            let list_response: FileListResponse = Self::check(response).await?.json().await?;
            all_files.extend(list_response.files);

            if let Some(limit) = limit {
                if all_files.len() >= limit {
                    all_files.truncate(limit);
                    break;
                }
            }

            match list_response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(all_files)
    }

    /// Create an entity that has no content, such as a folder.
    async fn create_metadata_only(
        &self,
        entity: &NewEntity,
        mime_type: &str,
        opts: &RequestOptions,
    ) -> Result<FileMetadata> {
        let metadata = self.create_body(entity, mime_type);
        let request = self
            .http
            .post(self.files_url(""))
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(&metadata);

        let response = self.prepare(request, opts).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    fn create_body(&self, entity: &NewEntity, mime_type: &str) -> serde_json::Value {
        let parent = entity.parent.as_deref().unwrap_or(&self.root_id);
        let mut metadata = json!({
            "name": entity.name,
            "mimeType": mime_type,
            "parents": [parent]
        });
        if let Some(drive_id) = &self.drive_id {
            metadata["driveId"] = json!(drive_id);
        }
        metadata
    }

    /// Upload a file using multipart upload (for smaller files).
    async fn upload_multipart(
        &self,
        entity: &NewEntity,
        content: Vec<u8>,
        mime_type: &str,
        opts: &RequestOptions,
    ) -> Result<FileMetadata> {
        let metadata = self.create_body(entity, mime_type);

        let metadata_part = Part::text(metadata.to_string()).mime_str("application/json")?;

        let file_part = Part::bytes(content)
            .file_name(entity.name.clone())
            .mime_str(mime_type)?;

        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let request = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .multipart(form);

        let response = self.prepare(request, opts).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Upload a file using resumable upload (for larger files).
    async fn upload_resumable(
        &self,
        entity: &NewEntity,
        content: Vec<u8>,
        mime_type: &str,
        opts: &RequestOptions,
    ) -> Result<FileMetadata> {
        let metadata = self.create_body(entity, mime_type);
        let file_size = content.len();

        // Step 1: Initiate resumable upload
        let request = self
            .http
            .post(format!("{}/files", self.upload_base))
            .query(&[("uploadType", "resumable"), ("supportsAllDrives", "true")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", file_size.to_string())
            .json(&metadata);

        let init_response = Self::check(self.prepare(request, opts).await?.send().await?).await?;

        let upload_url = init_response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DriveError::ApiError {
                status: 500,
                message: "No upload URL in response".to_string(),
            })?
            .to_string();

        // Step 2: Upload the file content
        let request = self
            .http
            .put(&upload_url)
            .header("Content-Type", mime_type)
            .header("Content-Length", file_size.to_string())
            .query(&[("fields", FILE_FIELDS)])
            .body(content);

        let response = self.prepare(request, opts).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn media_response(&self, id: &str, opts: &RequestOptions) -> Result<Response> {
        let request = self
            .http
            .get(self.files_url(id))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        let response = self.prepare(request, opts).await?.send().await?;
        Self::check(response).await
    }
}

#[async_trait]
impl RemoteDrive for DriveApiClient {
    fn root_id(&self) -> &str {
        &self.root_id
    }

    async fn create(&self, mut entity: NewEntity, opts: &RequestOptions) -> Result<FileMetadata> {
        let mime_type = entity.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&entity.name)
                .first_or_octet_stream()
                .to_string()
        });
        debug!(name = %entity.name, mime_type = %mime_type, "creating remote entity");

        match entity.content.take() {
            None => self.create_metadata_only(&entity, &mime_type, opts).await,
            Some(content) if content.len() > RESUMABLE_THRESHOLD => {
                self.upload_resumable(&entity, content, &mime_type, opts).await
            }
            Some(content) => self.upload_multipart(&entity, content, &mime_type, opts).await,
        }
    }

    async fn get(&self, id: &str, opts: &RequestOptions) -> Result<FileMetadata> {
        let request = self
            .http
            .get(self.files_url(id))
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)]);

        let response = self.prepare(request, opts).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn get_content(&self, id: &str, opts: &RequestOptions) -> Result<Vec<u8>> {
        let response = self.media_response(id, opts).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_content_to(
        &self,
        id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        opts: &RequestOptions,
    ) -> Result<u64> {
        let response = self.media_response(id, opts).await?;

        // Stream to the sink
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        Ok(written)
    }

    async fn list(
        &self,
        query: &Query,
        limit: Option<usize>,
        opts: &RequestOptions,
    ) -> Result<Vec<FileMetadata>> {
        let q = query.to_query_string();
        debug!(query = %q, ?limit, "listing remote entities");
        self.query_files(&q, limit, opts).await
    }

    async fn update(
        &self,
        id: &str,
        patch: EntityPatch,
        opts: &RequestOptions,
    ) -> Result<FileMetadata> {
        let mut params = vec![
            ("supportsAllDrives", "true".to_string()),
            ("fields", FILE_FIELDS.to_string()),
        ];
        if !patch.add_parents.is_empty() {
            params.push(("addParents", patch.add_parents.join(",")));
        }
        if !patch.remove_parents.is_empty() {
            params.push(("removeParents", patch.remove_parents.join(",")));
        }

        let body = match &patch.name {
            Some(name) => json!({ "name": name }),
            None => json!({}),
        };

        let request = self
            .http
            .patch(self.files_url(id))
            .query(&params)
            .json(&body);

        let response = self.prepare(request, opts).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete(&self, id: &str, opts: &RequestOptions) -> Result<()> {
        let request = self
            .http
            .delete(self.files_url(id))
            .query(&[("supportsAllDrives", "true")]);

        let response = self.prepare(request, opts).await?.send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn copy(
        &self,
        id: &str,
        name: &str,
        parent: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<FileMetadata> {
        let mut body = json!({ "name": name });
        if let Some(parent) = parent {
            body["parents"] = json!([parent]);
        }

        let request = self
            .http
            .post(self.files_url(&format!("{}/copy", id)))
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .json(&body);

        let response = self.prepare(request, opts).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_permission(
        &self,
        id: &str,
        permission: &PermissionRequest,
        opts: &RequestOptions,
    ) -> Result<Permission> {
        let request = self
            .http
            .post(self.files_url(&format!("{}/permissions", id)))
            .query(&[("supportsAllDrives", "true")])
            .json(permission);

        let response = self.prepare(request, opts).await?.send().await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    // Tests are in tests/client_test.rs
}
