//! S3 Upload Stage (§4.8 step 4, step 7 "S3 (when used as a mirror)"): a
//! thin probe-and-handoff shim. Unlike Drive, S3 does not drive its own
//! multipart loop here — that loop belongs to the Sync Stage (Open Question
//! (b): the Sync Stage is the canonical, only implementation of S3
//! multipart transfer), so this stage's job is to validate bucket access,
//! create the Sync row, and get out of the way.

use std::path::Path;
use std::time::Duration;

use torreclou_core::error::TorreClouError;
use torreclou_core::job::{Job, JobStatus, TransitionSource};
use torreclou_core::provider::StorageProfile;
use torreclou_core::sync::default_s3_key_prefix;
use torreclou_eventlog::{EventLog, SyncStreamEntry};
use torreclou_lease::{s3_lock_key, LeaseManager};
use torreclou_s3transport::{build_s3_target, probe_bucket_access};
use torreclou_store::jobs::JobStore;
use torreclou_store::syncs::SyncStore;

#[derive(Debug, thiserror::Error)]
pub enum S3StageError {
    #[error("transport error: {0}")]
    Transport(#[from] TorreClouError),
}

pub struct S3UploadStage {
    job_store: JobStore,
    sync_store: SyncStore,
    event_log: EventLog,
    lease_manager: LeaseManager,
}

impl S3UploadStage {
    pub fn new(job_store: JobStore, sync_store: SyncStore, event_log: EventLog, lease_manager: LeaseManager) -> Self {
        Self { job_store, sync_store, event_log, lease_manager }
    }

    /// Runs §4.8 steps 1-7 for an S3-profile job: acquire lease, transition
    /// to UPLOADING, probe bucket access, hand off to the Sync Stage, then
    /// transition the Job straight to COMPLETED — the Job's lifecycle ends
    /// here even though the bytes have not left local disk yet; the Sync
    /// entity tracks the rest independently.
    pub async fn execute(&self, job: &Job, profile: &StorageProfile) -> Result<(), S3StageError> {
        let lease_ttl = Duration::from_secs(2 * 3600);
        let lease = match self.lease_manager.acquire(&s3_lock_key(job.id), lease_ttl).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::info!(job_id = job.id, "s3 lease held by another worker, skipping");
                return Ok(());
            }
            Err(e) => return Err(TorreClouError::S3Error(e.to_string()).into()),
        };

        if job.status != JobStatus::Uploading {
            self.job_store
                .transition(job.id, JobStatus::Uploading, TransitionSource::Worker, None, None)
                .await?;
        }
        self.job_store.set_heartbeat(job.id).await.map_err(|_| TorreClouError::JobNotFound)?;

        let download_path = job.download_path.clone().ok_or(TorreClouError::FileNotFound)?;
        if !Path::new(&download_path).exists() {
            return Err(TorreClouError::FileNotFound.into());
        }

        // Step 4: static-key credentials, ListObjects probe.
        let target = build_s3_target(&profile.credentials_json)?;
        probe_bucket_access(&target.client, &target.bucket).await?;

        // Step 6/7: hand off to the Sync Stage (§4.9) instead of uploading here.
        let sync = self
            .sync_store
            .get_or_create(job.id, &download_path, &default_s3_key_prefix(job.id))
            .await
            .map_err(|_| TorreClouError::JobNotFound)?;

        self.event_log
            .append_sync(&SyncStreamEntry::new(job.id, sync.id))
            .await
            .map_err(|e| TorreClouError::S3Error(e.to_string()))?;

        self.job_store
            .transition(job.id, JobStatus::Completed, TransitionSource::Worker, None, None)
            .await?;

        self.lease_manager.release(&lease).await.map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        tracing::info!(job_id = job.id, sync_id = sync.id, "s3 upload handed off to sync stage");
        Ok(())
    }

    /// Classifies a failed probe/handoff attempt into `UPLOAD_RETRY`
    /// (attempts remain) or the generic terminal `UPLOAD_FAILED`
    /// (exhausted) — e.g. a bucket-access probe returning `AccessDenied`.
    pub async fn classify_failure(&self, job_id: i64, reason: &str, retries_remain: bool) -> Result<(), S3StageError> {
        let status = if retries_remain { JobStatus::UploadRetry } else { JobStatus::UploadFailed };
        self.job_store
            .transition(job_id, status, TransitionSource::Worker, Some(reason.to_string()), None)
            .await?;
        Ok(())
    }
}
