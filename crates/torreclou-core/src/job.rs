//! Job entity (§3) and its status set (§4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BackgroundTaskId, JobId, RequestedFileId, StorageProfileId, UserId};

/// Job state set, exactly as enumerated in spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Downloading,
    PendingUpload,
    Uploading,
    TorrentDownloadRetry,
    UploadRetry,
    Completed,
    Failed,
    Cancelled,
    TorrentFailed,
    UploadFailed,
    GoogleDriveFailed,
}

impl JobStatus {
    /// Terminal statuses are sinks: `COMPLETED, FAILED, CANCELLED, *_FAILED`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::Cancelled
                | JobStatus::TorrentFailed
                | JobStatus::UploadFailed
                | JobStatus::GoogleDriveFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Downloading => "DOWNLOADING",
            JobStatus::PendingUpload => "PENDING_UPLOAD",
            JobStatus::Uploading => "UPLOADING",
            JobStatus::TorrentDownloadRetry => "TORRENT_DOWNLOAD_RETRY",
            JobStatus::UploadRetry => "UPLOAD_RETRY",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::TorrentFailed => "TORRENT_FAILED",
            JobStatus::UploadFailed => "UPLOAD_FAILED",
            JobStatus::GoogleDriveFailed => "GOOGLE_DRIVE_FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "QUEUED" => JobStatus::Queued,
            "DOWNLOADING" => JobStatus::Downloading,
            "PENDING_UPLOAD" => JobStatus::PendingUpload,
            "UPLOADING" => JobStatus::Uploading,
            "TORRENT_DOWNLOAD_RETRY" => JobStatus::TorrentDownloadRetry,
            "UPLOAD_RETRY" => JobStatus::UploadRetry,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            "TORRENT_FAILED" => JobStatus::TorrentFailed,
            "UPLOAD_FAILED" => JobStatus::UploadFailed,
            "GOOGLE_DRIVE_FAILED" => JobStatus::GoogleDriveFailed,
            _ => return None,
        })
    }
}

/// Who (or what) caused a status transition; recorded on every history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TransitionSource {
    Worker,
    User,
    System,
    Recovery,
}

/// One Job row (§3). `selectedFilePaths` empty means "all files".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub storage_profile_id: StorageProfileId,
    pub requested_file_id: RequestedFileId,
    pub status: JobStatus,
    pub selected_file_paths: Vec<String>,
    pub download_path: Option<String>,
    pub bytes_downloaded: i64,
    pub total_bytes: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub background_task_id: Option<BackgroundTaskId>,
    pub error_message: Option<String>,
    pub current_state_label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Invariant (c): `bytesDownloaded <= totalBytes` once `totalBytes > 0`.
    pub fn bytes_downloaded_is_valid(&self) -> bool {
        self.total_bytes <= 0 || self.bytes_downloaded <= self.total_bytes
    }

    /// Invariant (d): `completedAt` non-null iff status is terminal.
    pub fn completed_at_is_valid(&self) -> bool {
        self.completed_at.is_some() == self.status.is_terminal()
    }

    /// Invariant (b): `downloadPath` is immutable once set while the job is
    /// in an active transfer status.
    pub fn download_path_is_locked(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Downloading | JobStatus::PendingUpload | JobStatus::Uploading
        )
    }
}
