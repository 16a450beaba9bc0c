//! Remote file store client.
//!
//! [`FileStore`] is the narrow seam the pipeline sees: resolve one item's
//! metadata, list a folder's children, download a file's bytes. [`DriveStore`]
//! implements it against the Google Drive v3 REST API with a bearer token
//! read from the environment; the OAuth dance that produced the token is a
//! separate collaborator and opaque here.
//!
//! Listings come back newest-first (`orderBy=modifiedTime desc`) and are
//! paginated transparently. Every request has an explicit timeout and a
//! bounded retry loop: HTTP 429 and 5xx and network errors retry with
//! exponential backoff, other 4xx fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::StoreConfig;
use crate::error::PipelineError;
use crate::models::{DocumentReference, MimeType};

/// Alias the file store uses for the drive's root folder.
pub const ROOT_FOLDER_ID: &str = "root";

/// What the pipeline needs from the remote file store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Resolve a single item (file or folder) by id.
    async fn metadata(&self, id: &str) -> Result<DocumentReference, PipelineError>;

    /// List a folder's direct children, newest-first, optionally filtered by
    /// a name substring.
    async fn list_children_matching(
        &self,
        folder_id: &str,
        name_query: Option<&str>,
    ) -> Result<Vec<DocumentReference>, PipelineError>;

    /// List a folder's direct children, newest-first.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DocumentReference>, PipelineError> {
        self.list_children_matching(folder_id, None).await
    }

    /// Download a file's raw bytes.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Google Drive v3 client.
pub struct DriveStore {
    client: reqwest::Client,
    base_url: String,
    token_env: String,
    max_retries: u32,
}

impl DriveStore {
    pub fn new(config: &StoreConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::RemoteCall(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token_env: config.token_env.clone(),
            max_retries: config.max_retries,
        })
    }

    fn token(&self) -> Result<String, PipelineError> {
        std::env::var(&self.token_env).map_err(|_| {
            PipelineError::RemoteCall(format!(
                "{} environment variable not set",
                self.token_env
            ))
        })
    }

    /// Signed GET with the shared retry/backoff discipline.
    async fn get_with_retry(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, PipelineError> {
        let token = self.token()?;
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .get(url)
                .query(query)
                .bearer_auth(&token)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::RemoteCall(format!(
                            "file store error {}: {}",
                            status, body
                        )));
                        continue;
                    }

                    // Client error (not 429), don't retry
                    let body = response.text().await.unwrap_or_default();
                    return Err(PipelineError::RemoteCall(format!(
                        "file store error {}: {}",
                        status, body
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::RemoteCall(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::RemoteCall("file store request failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl FileStore for DriveStore {
    async fn metadata(&self, id: &str) -> Result<DocumentReference, PipelineError> {
        let url = format!("{}/files/{}", self.base_url, id);
        let query = [(
            "fields",
            "id, name, mimeType, modifiedTime, parents".to_string(),
        )];
        let resp = self.get_with_retry(&url, &query).await?;
        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::RemoteCall(e.to_string()))?;
        parse_reference(&json)
    }

    async fn list_children_matching(
        &self,
        folder_id: &str,
        name_query: Option<&str>,
    ) -> Result<Vec<DocumentReference>, PipelineError> {
        let url = format!("{}/files", self.base_url);
        let q = children_query(folder_id, name_query);

        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("q", q.clone()),
                (
                    "fields",
                    "nextPageToken, files(id, name, mimeType, modifiedTime, parents)".to_string(),
                ),
                ("orderBy", "modifiedTime desc".to_string()),
                ("pageSize", "1000".to_string()),
            ];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp = self.get_with_retry(&url, &query).await?;
            let json: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| PipelineError::RemoteCall(e.to_string()))?;

            if let Some(files) = json.get("files").and_then(|v| v.as_array()) {
                for file in files {
                    refs.push(parse_reference(file)?);
                }
            }

            match json.get("nextPageToken").and_then(|v| v.as_str()) {
                Some(token) => page_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(refs)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, PipelineError> {
        let url = format!("{}/files/{}", self.base_url, file_id);
        let query = [("alt", "media".to_string())];
        let resp = self.get_with_retry(&url, &query).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::RemoteCall(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Build the Drive `q` expression selecting a folder's direct children,
/// optionally narrowed by a name substring.
fn children_query(folder_id: &str, name_query: Option<&str>) -> String {
    let mut q = format!("'{}' in parents and trashed = false", escape_q(folder_id));
    if let Some(needle) = name_query {
        q.push_str(&format!(" and name contains '{}'", escape_q(needle)));
    }
    q
}

/// Escape single quotes and backslashes for embedding in a Drive `q` string.
fn escape_q(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Parse one Drive file resource into a [`DocumentReference`].
fn parse_reference(value: &serde_json::Value) -> Result<DocumentReference, PipelineError> {
    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| PipelineError::RemoteCall("listing entry missing id".to_string()))?
        .to_string();
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mime_type = MimeType::parse(
        value
            .get("mimeType")
            .and_then(|v| v.as_str())
            .unwrap_or_default(),
    );
    let modified_time = value
        .get("modifiedTime")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let parent_id = value
        .get("parents")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let is_folder = mime_type == MimeType::Folder;

    Ok(DocumentReference {
        id,
        name,
        mime_type,
        modified_time,
        is_folder,
        parent_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_query_includes_parent_and_trash_filter() {
        let q = children_query("folder123", None);
        assert_eq!(q, "'folder123' in parents and trashed = false");
    }

    #[test]
    fn children_query_appends_name_filter() {
        let q = children_query("folder123", Some("report"));
        assert!(q.ends_with("and name contains 'report'"));
    }

    #[test]
    fn query_values_are_escaped() {
        let q = children_query("fo'lder", Some("o'brien"));
        assert!(q.contains("'fo\\'lder' in parents"));
        assert!(q.contains("name contains 'o\\'brien'"));
    }

    #[test]
    fn parse_reference_maps_drive_fields() {
        let value = serde_json::json!({
            "id": "abc123",
            "name": "report.pdf",
            "mimeType": "application/pdf",
            "modifiedTime": "2024-03-01T12:30:00Z",
            "parents": ["folder9"],
        });
        let reference = parse_reference(&value).unwrap();
        assert_eq!(reference.id, "abc123");
        assert_eq!(reference.name, "report.pdf");
        assert_eq!(reference.mime_type, MimeType::Pdf);
        assert!(!reference.is_folder);
        assert_eq!(reference.parent_id.as_deref(), Some("folder9"));
        assert_eq!(reference.modified_time.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn parse_reference_detects_folders() {
        let value = serde_json::json!({
            "id": "f1",
            "name": "Reports",
            "mimeType": "application/vnd.google-apps.folder",
        });
        let reference = parse_reference(&value).unwrap();
        assert!(reference.is_folder);
        assert_eq!(reference.mime_type, MimeType::Folder);
        assert!(reference.parent_id.is_none());
    }

    #[test]
    fn parse_reference_requires_id() {
        let value = serde_json::json!({ "name": "nameless" });
        assert!(parse_reference(&value).is_err());
    }
}
