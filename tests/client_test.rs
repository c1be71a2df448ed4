//! Tests for DriveApiClient with mocked HTTP responses.

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use vdrive::auth::Credentials;
use vdrive::models::{FileListResponse, FileMetadata, PermissionRequest, ServiceAccountCredentials};
use vdrive::query::Query;
use vdrive::remote::{EntityPatch, NewEntity, RemoteDrive, RequestOptions};
use vdrive::{Authenticator, Drive, DriveApiClient, DriveError, FOLDER_MIME_TYPE};

fn client_for(server: &ServerGuard) -> DriveApiClient {
    DriveApiClient::new(Authenticator::from_access_token("test-token"))
        .with_base_urls(server.url(), server.url())
}

fn opts() -> RequestOptions {
    RequestOptions::default()
}

mod models {
    use super::*;

    #[test]
    fn test_file_metadata_deserialization() {
        let json = json!({
            "id": "file123",
            "name": "document.pdf",
            "mimeType": "application/pdf",
            "webViewLink": "https://drive.google.com/file/d/file123/view",
            "size": "2048",
            "parents": ["folder1"]
        });

        let metadata: FileMetadata = serde_json::from_value(json).unwrap();

        assert_eq!(metadata.id, "file123");
        assert_eq!(metadata.mime_type, Some("application/pdf".to_string()));
        assert_eq!(metadata.size, Some(2048));
        assert_eq!(metadata.parents, vec!["folder1".to_string()]);
    }

    #[test]
    fn test_folder_metadata_without_size() {
        let json = json!({
            "id": "folder123",
            "name": "My Folder",
            "mimeType": FOLDER_MIME_TYPE
        });

        let metadata: FileMetadata = serde_json::from_value(json).unwrap();

        assert_eq!(metadata.size, None);
        assert!(metadata.parents.is_empty());
    }

    #[test]
    fn test_file_list_response_deserialization() {
        let json = json!({
            "files": [
                {"id": "f1", "name": "file1.txt"},
                {"id": "f2", "name": "file2.txt"}
            ],
            "nextPageToken": "token123"
        });

        let response: FileListResponse = serde_json::from_value(json).unwrap();

        assert_eq!(response.files.len(), 2);
        assert_eq!(response.next_page_token, Some("token123".to_string()));
    }
}

mod credentials {
    use super::*;

    #[test]
    fn test_credentials_from_json() {
        let json = json!({
            "client_email": "test@project.iam.gserviceaccount.com",
            "private_key": "key",
            "token_uri": "https://oauth2.googleapis.com/token"
        });

        let creds: ServiceAccountCredentials = serde_json::from_value(json).unwrap();

        assert_eq!(creds.client_email, "test@project.iam.gserviceaccount.com");
        assert_eq!(creds.token_uri, Some("https://oauth2.googleapis.com/token".to_string()));
    }

    #[test]
    fn test_authenticator_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let creds_json = json!({
            "client_email": "test@project.iam.gserviceaccount.com",
            "private_key": "key"
        });
        temp_file.write_all(creds_json.to_string().as_bytes()).unwrap();

        assert!(Authenticator::from_file(temp_file.path()).is_ok());
    }

    #[test]
    fn test_authenticator_from_missing_file() {
        let err = Authenticator::from_file("/nonexistent/path/credentials.json")
            .err()
            .unwrap();
        assert!(matches!(err, DriveError::CredentialsFileError { .. }));
    }

    #[test]
    fn test_authenticator_from_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();

        let err = Authenticator::from_file(temp_file.path()).err().unwrap();
        assert!(matches!(err, DriveError::CredentialsParseError(_)));
    }

    #[tokio::test]
    async fn test_refresh_token_is_exchanged_once() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "r-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": "fresh", "expires_in": 3600}).to_string())
            .expect(1)
            .create_async()
            .await;

        let auth = Authenticator::new(Credentials::RefreshToken {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: "r-1".into(),
        })
        .with_token_uri(format!("{}/token", server.url()));

        assert_eq!(auth.get_access_token().await.unwrap(), "fresh");
        assert_eq!(auth.get_access_token().await.unwrap(), "fresh");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_token_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let auth = Authenticator::new(Credentials::RefreshToken {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: "revoked".into(),
        })
        .with_token_uri(format!("{}/token", server.url()));

        let err = auth.get_access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::TokenRefreshError(ref m) if m.contains("invalid_grant")));
    }
}

mod api {
    use super::*;

    #[tokio::test]
    async fn list_follows_pages_up_to_limit() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/files")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("pageSize".into(), "3".into()),
                Matcher::UrlEncoded("corpora".into(), "user".into()),
                Matcher::UrlEncoded(
                    "q".into(),
                    "name contains 'inv' and trashed = false".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "files": [{"id": "a", "name": "inv-1"}, {"id": "b", "name": "inv-2"}],
                    "nextPageToken": "page-2"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("pageSize".into(), "1".into()),
                Matcher::UrlEncoded("pageToken".into(), "page-2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "files": [{"id": "c", "name": "inv-3"}],
                    "nextPageToken": "page-3"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let query = Query::new().name_contains("inv").not_trashed();
        let files = client.list(&query, Some(3), &opts()).await.unwrap();

        let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn shared_drive_listing_is_scoped() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("corpora".into(), "drive".into()),
                Matcher::UrlEncoded("driveId".into(), "team-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": []}).to_string())
            .create_async()
            .await;

        let client = client_for(&server).with_shared_drive("team-1");
        assert_eq!(client.root_id(), "team-1");
        assert_eq!(client.drive_id(), Some("team-1"));

        let files = client.list(&Query::new(), None, &opts()).await.unwrap();
        assert!(files.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_missing_file_is_api_404() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/files/nope")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(json!({"error": {"code": 404, "message": "File not found: nope."}}).to_string())
            .create_async()
            .await;

        let err = client_for(&server).get("nope", &opts()).await.unwrap_err();
        assert!(err.is_remote_not_found());
        assert!(matches!(err, DriveError::ApiError { ref message, .. } if message.contains("nope")));
    }

    #[tokio::test]
    async fn server_errors_keep_raw_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/files/f1")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("backend unavailable")
            .create_async()
            .await;

        let err = client_for(&server).get("f1", &opts()).await.unwrap_err();
        assert!(matches!(
            err,
            DriveError::ApiError { status: 503, ref message } if message == "backend unavailable"
        ));
        assert!(!err.is_remote_not_found());
    }

    #[tokio::test]
    async fn create_folder_posts_metadata_under_root() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/files")
            .match_query(Matcher::UrlEncoded("supportsAllDrives".into(), "true".into()))
            .match_body(Matcher::PartialJson(json!({
                "name": "docs",
                "mimeType": FOLDER_MIME_TYPE,
                "parents": ["root"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"id": "d1", "name": "docs", "mimeType": FOLDER_MIME_TYPE, "parents": ["root"]})
                    .to_string(),
            )
            .create_async()
            .await;

        let created = client_for(&server)
            .create(NewEntity::folder("docs", None), &opts())
            .await
            .unwrap();
        assert_eq!(created.id, "d1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_file_uses_multipart_upload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/files")
            .match_query(Matcher::UrlEncoded("uploadType".into(), "multipart".into()))
            .match_body(Matcher::Regex("hello world".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"id": "f1", "name": "a.txt", "mimeType": "text/plain", "size": "11"})
                    .to_string(),
            )
            .create_async()
            .await;

        let created = client_for(&server)
            .create(
                NewEntity::file("a.txt", Some("p1"), b"hello world".to_vec()),
                &opts(),
            )
            .await
            .unwrap();
        assert_eq!(created.size, Some(11));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn download_streams_into_sink() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/files/f1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body("file body")
            .create_async()
            .await;

        let client = client_for(&server);
        assert_eq!(client.get_content("f1", &opts()).await.unwrap(), b"file body");

        let mut sink: Vec<u8> = Vec::new();
        let written = client.get_content_to("f1", &mut sink, &opts()).await.unwrap();
        assert_eq!(written, 9);
        assert_eq!(sink, b"file body");
    }

    #[tokio::test]
    async fn update_sends_name_and_parent_changes() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/files/f1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("addParents".into(), "new".into()),
                Matcher::UrlEncoded("removeParents".into(), "old".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "f1", "name": "a.txt", "parents": ["new"]}).to_string())
            .create_async()
            .await;

        let updated = client_for(&server)
            .update("f1", EntityPatch::reparent("new", vec!["old".into()]), &opts())
            .await
            .unwrap();
        assert_eq!(updated.parents, vec!["new".to_string()]);
        mock.assert_async().await;

        let rename = server
            .mock("PATCH", "/files/f1")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({"name": "b.txt"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "f1", "name": "b.txt"}).to_string())
            .create_async()
            .await;

        let renamed = client_for(&server)
            .update("f1", EntityPatch::rename("b.txt"), &opts())
            .await
            .unwrap();
        assert_eq!(renamed.name, "b.txt");
        rename.assert_async().await;
    }

    #[tokio::test]
    async fn delete_copy_and_permissions() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/files/f1")
            .match_query(Matcher::Any)
            .with_status(204)
            .create_async()
            .await;
        let copy = server
            .mock("POST", "/files/f1/copy")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"name": "copy.txt", "parents": ["p2"]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "f2", "name": "copy.txt"}).to_string())
            .create_async()
            .await;
        let permission = server
            .mock("POST", "/files/f1/permissions")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({"role": "reader", "type": "anyone"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "anyoneWithLink", "role": "reader", "type": "anyone"}).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        client.delete("f1", &opts()).await.unwrap();

        let copied = client.copy("f1", "copy.txt", Some("p2"), &opts()).await.unwrap();
        assert_eq!(copied.id, "f2");

        let request = PermissionRequest {
            role: "reader".into(),
            permission_type: "anyone".into(),
            email_address: None,
            domain: None,
        };
        let granted = client.create_permission("f1", &request, &opts()).await.unwrap();
        assert_eq!(granted.id, "anyoneWithLink");

        delete.assert_async().await;
        copy.assert_async().await;
        permission.assert_async().await;
    }

    #[tokio::test]
    async fn facade_over_http_resolves_by_name() {
        let mut server = Server::new_async().await;
        let lookup = server
            .mock("GET", "/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "name = 'report.txt' and trashed = false".into()),
                Matcher::UrlEncoded("pageSize".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [{"id": "r1", "name": "report.txt"}]}).to_string())
            .expect(1)
            .create_async()
            .await;
        let _content = server
            .mock("GET", "/files/r1")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body("numbers")
            .create_async()
            .await;

        let drive = Drive::new(Arc::new(client_for(&server)));
        assert!(drive.exists("report.txt").await.unwrap());
        // Second lookup is served from the cache.
        let body = drive.download("report.txt").await.unwrap().unwrap();
        assert_eq!(body, b"numbers");
        lookup.assert_async().await;
    }
}

mod error_handling {
    use vdrive::error::DriveError;

    #[test]
    fn test_error_display() {
        let err = DriveError::ApiError {
            status: 404,
            message: "File not found".to_string(),
        };

        let display = format!("{}", err);
        assert!(display.contains("404"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_context_names_operation_and_target() {
        let err = DriveError::ApiError {
            status: 500,
            message: "boom".into(),
        }
        .context("rename", "a/b.txt");

        let display = err.to_string();
        assert!(display.contains("rename"));
        assert!(display.contains("a/b.txt"));
        assert!(display.contains("boom"));
    }
}

mod file_metadata_display {
    use vdrive::models::FileMetadata;

    #[test]
    fn test_display_with_all_fields() {
        let metadata = FileMetadata {
            id: "abc123".to_string(),
            name: "document.pdf".to_string(),
            mime_type: Some("application/pdf".to_string()),
            size: Some(1048576),
            ..Default::default()
        };

        let display = format!("{}", metadata);
        assert!(display.contains("abc123"));
        assert!(display.contains("document.pdf"));
        assert!(display.contains("1.00 MB"));
        assert!(display.contains("application/pdf"));
    }
}
