//! Google Drive v3 resumable-upload transport (§4.8 step 6, "Folder
//! hierarchy (Drive)"). Unlike S3, Drive has no notion of a part etag; each
//! `PUT` chunk response carries a `Range` header (incomplete) or the final
//! file resource (complete). We synthesize a `PartETag.etag` from the
//! chunk's byte range so the generic `{partNumber, etag}` bookkeeping in
//! `TransferProgress` still applies uniformly across providers.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use torreclou_core::error::TorreClouError;
use torreclou_core::transfer_progress::PartETag;

use crate::oauth::DriveTokenProvider;
use crate::transport::{RemoteLocation, UploadTransport};

const FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3/files";

pub struct DriveTransport {
    http: Client,
    tokens: DriveTokenProvider,
    refresh_token: String,
}

impl DriveTransport {
    pub fn new(http: Client, tokens: DriveTokenProvider, refresh_token: String) -> Self {
        Self { http, tokens, refresh_token }
    }

    async fn bearer(&self) -> Result<String, TorreClouError> {
        self.tokens.access_token(&self.refresh_token).await
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\'', "\\'")
}

#[async_trait]
impl UploadTransport for DriveTransport {
    async fn find_or_create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String, TorreClouError> {
        let token = self.bearer().await?;
        let mut query = format!("name = '{}' and mimeType = 'application/vnd.google-apps.folder' and trashed = false", escape_query(name));
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }

        let response = self
            .http
            .get(FILES_API)
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await
            .map_err(|e| TorreClouError::S3Error(e.to_string()))?;

        let body: serde_json::Value =
            response.json().await.map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        if let Some(id) = body["files"][0]["id"].as_str() {
            return Ok(id.to_string());
        }

        let mut metadata = json!({ "name": name, "mimeType": "application/vnd.google-apps.folder" });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let created: serde_json::Value = self
            .http
            .post(FILES_API)
            .bearer_auth(&token)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| TorreClouError::S3Error(e.to_string()))?
            .json()
            .await
            .map_err(|e| TorreClouError::S3Error(e.to_string()))?;

        created["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TorreClouError::S3Error("drive did not return a folder id".to_string()))
    }

    async fn find_existing(&self, location: &RemoteLocation) -> Result<Option<String>, TorreClouError> {
        let token = self.bearer().await?;
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(&location.file_name),
            escape_query(&location.folder_id)
        );

        let body: serde_json::Value = self
            .http
            .get(FILES_API)
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await
            .map_err(|e| TorreClouError::S3Error(e.to_string()))?
            .json()
            .await
            .map_err(|e| TorreClouError::S3Error(e.to_string()))?;

        Ok(body["files"][0]["id"].as_str().map(str::to_string))
    }

    async fn initiate(&self, location: &RemoteLocation, total_bytes: i64) -> Result<String, TorreClouError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(UPLOAD_API)
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", total_bytes.to_string())
            .json(&json!({ "name": location.file_name, "parents": [location.folder_id] }))
            .send()
            .await
            .map_err(|e| TorreClouError::InitUploadFailed(e.to_string()))?;

        response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| TorreClouError::InitUploadFailed("missing resumable session Location".to_string()))
    }

    async fn upload_part(
        &self,
        provider_upload_id: &str,
        part_number: i32,
        total_bytes: i64,
        part_size: i64,
        bytes: Vec<u8>,
    ) -> Result<PartETag, TorreClouError> {
        let start = (part_number as i64 - 1) * part_size;
        let end = start + bytes.len() as i64 - 1;

        let response = self
            .http
            .put(provider_upload_id)
            .header("Content-Length", bytes.len().to_string())
            .header("Content-Range", format!("bytes {start}-{end}/{total_bytes}"))
            .body(bytes)
            .send()
            .await
            .map_err(|e| TorreClouError::UploadPartFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::PERMANENT_REDIRECT => {
                Ok(PartETag { part_number, etag: format!("bytes={start}-{end}") })
            }
            status => Err(TorreClouError::UploadPartFailed(format!("unexpected status {status}"))),
        }
    }

    async fn complete(&self, _provider_upload_id: &str, _location: &RemoteLocation) -> Result<(), TorreClouError> {
        // Drive finalizes the file on the last chunk's 200/201 response;
        // there is no separate completion call.
        Ok(())
    }
}
