//! The provider-agnostic resumable-upload contract (§4.8 step 6). Only
//! Google Drive implements it today; S3 is handed a thin probe-and-handoff
//! shim instead (see `s3_stage`) since its multipart loop already lives in
//! `torreclou-s3transport` and is driven canonically by the Sync Stage.

use async_trait::async_trait;
use torreclou_core::error::TorreClouError;
use torreclou_core::transfer_progress::PartETag;

/// One file's destination within a provider's remote namespace, resolved
/// once per file before the part loop starts.
#[derive(Debug, Clone)]
pub struct RemoteLocation {
    pub folder_id: String,
    pub file_name: String,
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Finds a folder by name under `parent_id` (`None` = root), creating it
    /// if absent (§4.8 "Parent folders are created or found idempotently by
    /// name within a parent folder id").
    async fn find_or_create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String, TorreClouError>;

    /// Queries the remote for a pre-existing object of the same name in the
    /// target folder (§4.8 step 6). `Some(remote_id)` means it is already
    /// complete.
    async fn find_existing(&self, location: &RemoteLocation) -> Result<Option<String>, TorreClouError>;

    /// Initiates a resumable upload session, returning a `providerUploadId`.
    async fn initiate(&self, location: &RemoteLocation, total_bytes: i64) -> Result<String, TorreClouError>;

    /// Uploads one fixed-size part, returning its `{partNumber, etag}`.
    async fn upload_part(
        &self,
        provider_upload_id: &str,
        part_number: i32,
        total_bytes: i64,
        part_size: i64,
        bytes: Vec<u8>,
    ) -> Result<PartETag, TorreClouError>;

    /// Finalizes the session once every part has been uploaded.
    async fn complete(&self, provider_upload_id: &str, location: &RemoteLocation) -> Result<(), TorreClouError>;
}
