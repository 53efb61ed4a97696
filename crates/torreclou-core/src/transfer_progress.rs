//! TransferProgress (§3): per-file resumable upload checkpoint shared by the
//! Drive upload transport and the S3 multipart transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, SyncId};

/// One completed part of a resumable/multipart upload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartETag {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TransferProgressStatus {
    InProgress,
    Completed,
    Failed,
}

/// One TransferProgress row. Keyed by `(job_id, sync_id, local_file_path)`;
/// `sync_id` is `None` for Upload-Stage transfers and `Some` for Sync-Stage
/// transfers (§3 "for sync stage").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProgress {
    pub job_id: JobId,
    pub sync_id: Option<SyncId>,
    pub local_file_path: String,
    pub remote_key: String,
    pub provider_upload_id: String,
    pub part_size: i64,
    pub total_parts: i32,
    pub parts_completed: i32,
    pub bytes_uploaded: i64,
    pub total_bytes: i64,
    pub part_etags: Vec<PartETag>,
    pub last_part_number: i32,
    pub status: TransferProgressStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransferProgress {
    /// Invariant: `partETags.length == partsCompleted`.
    pub fn part_etags_consistent(&self) -> bool {
        self.part_etags.len() as i32 == self.parts_completed
    }

    /// Invariant: `partsCompleted <= totalParts`.
    pub fn parts_completed_in_bounds(&self) -> bool {
        self.parts_completed <= self.total_parts
    }

    /// Default part size used when splitting a file into fixed-size parts
    /// (§4.8 step 6): 10 MiB.
    pub const DEFAULT_PART_SIZE: i64 = 10 * 1024 * 1024;

    /// Next part number to resume from: `max(existingParts.partNumber) + 1`.
    pub fn next_part_number(&self) -> i32 {
        self.last_part_number + 1
    }
}
