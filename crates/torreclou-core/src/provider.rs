//! StorageProfile (§6): read-only reference entity supplied by an external
//! collaborator. The core only ever reads `provider_type` (to pick a stage)
//! and `credentials_json` (to authenticate).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{StorageProfileId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ProviderType {
    GoogleDrive,
    S3,
    OneDrive,
    Dropbox,
}

impl ProviderType {
    /// Which background-task queue a job on this provider dispatches into.
    pub fn queue_name(self) -> &'static str {
        match self {
            ProviderType::GoogleDrive => "googledrive",
            ProviderType::S3 => "s3",
            // Not implemented by any stage in this workspace; routing is
            // still well-defined so StorageProfile validation can reject
            // them with a typed error instead of a wildcard panic.
            ProviderType::OneDrive => "onedrive",
            ProviderType::Dropbox => "dropbox",
        }
    }

    /// Whether a concrete Upload Stage exists for this provider.
    pub fn is_supported(self) -> bool {
        matches!(self, ProviderType::GoogleDrive | ProviderType::S3)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::GoogleDrive => "GoogleDrive",
            ProviderType::S3 => "S3",
            ProviderType::OneDrive => "OneDrive",
            ProviderType::Dropbox => "Dropbox",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "GoogleDrive" => ProviderType::GoogleDrive,
            "S3" => ProviderType::S3,
            "OneDrive" => ProviderType::OneDrive,
            "Dropbox" => ProviderType::Dropbox,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageProfile {
    pub id: StorageProfileId,
    pub user_id: UserId,
    pub profile_name: String,
    pub provider_type: ProviderType,
    pub credentials_json: Value,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
}
