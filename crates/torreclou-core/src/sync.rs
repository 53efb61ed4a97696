//! Sync entity (§3) and its status set (§4.2). At most one per Job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BackgroundTaskId, JobId, SyncId};

/// Sync state set, exactly as enumerated in spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Syncing,
    SyncRetry,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::SyncRetry => "SYNC_RETRY",
            SyncStatus::Completed => "COMPLETED",
            SyncStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => SyncStatus::Pending,
            "SYNCING" => SyncStatus::Syncing,
            "SYNC_RETRY" => SyncStatus::SyncRetry,
            "COMPLETED" => SyncStatus::Completed,
            "FAILED" => SyncStatus::Failed,
            _ => return None,
        })
    }
}

/// One Sync row (§3): created when the upload stage hands off to the sync
/// stage for an S3-profile job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sync {
    pub id: SyncId,
    pub job_id: JobId,
    pub status: SyncStatus,
    pub local_file_path: String,
    pub s3_key_prefix: String,
    pub total_bytes: i64,
    pub bytes_synced: i64,
    pub files_total: i64,
    pub files_synced: i64,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub background_task_id: Option<BackgroundTaskId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Default S3 key prefix when `Sync.s3KeyPrefix` has not been overridden.
pub fn default_s3_key_prefix(job_id: JobId) -> String {
    format!("torrents/{job_id}")
}
