//! Per-queue task bodies: each wraps one stage's `execute`, resolving the
//! Job/Sync/StorageProfile the stage needs from the task's `jobId`, then
//! translating a stage `Err` into the retry-vs-terminal call the runtime's
//! attempt bookkeeping is blind to (only the task itself knows whether
//! attempts remain).

use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use torreclou_core::error::TorreClouError;
use torreclou_core::job::Job;
use torreclou_core::provider::StorageProfile;
use torreclou_download::{DownloadStage, LibrqbitEngine};
use torreclou_lease::LeaseManager;
use torreclou_store::{JobStore, ProfileStore, RequestedFileStore, SyncStore, TransferProgressStore};
use torreclou_sync::SyncStage;
use torreclou_taskrt::Task;
use torreclou_upload::{DriveCredentials, DriveStage, DriveTokenProvider, DriveTransport, ProgressCache, S3UploadStage};

/// Everything a task handler needs, shared across every claimed task in
/// every queue's worker pool. Built once in `app.rs` and handed to
/// `run_worker_pool` behind an `Arc`.
pub struct Handlers {
    pub job_store: JobStore,
    pub sync_store: SyncStore,
    pub profiles: ProfileStore,
    pub requested_files: RequestedFileStore,
    pub transfer_progress: TransferProgressStore,
    pub progress_cache: ProgressCache,
    pub lease_manager: LeaseManager,
    pub download_stage: DownloadStage<LibrqbitEngine>,
    pub s3_stage: S3UploadStage,
    pub sync_stage: SyncStage,
    pub http: Client,
    pub upload_part_size: i64,
}

impl Handlers {
    async fn load_job(&self, job_id: i64) -> Result<Job, String> {
        self.job_store
            .load(job_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("job {job_id} not found"))
    }

    async fn load_profile(&self, profile_id: i64) -> Result<StorageProfile, String> {
        self.profiles
            .load(profile_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("storage profile {profile_id} not found"))
    }

    fn drive_transport(&self, profile: &StorageProfile) -> Result<DriveTransport, TorreClouError> {
        let creds: DriveCredentials =
            serde_json::from_value(profile.credentials_json.clone()).map_err(|_| TorreClouError::InvalidCredentialsJson)?;
        let tokens = DriveTokenProvider::new(&creds)?;
        Ok(DriveTransport::new(self.http.clone(), tokens, creds.refresh_token))
    }

    /// `torrents` queue: the BitTorrent download stage.
    pub async fn handle_torrent(&self, task: Task, cancellation: CancellationToken) -> Result<(), String> {
        let job = self.load_job(task.job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }

        let torrent_source = self
            .requested_files
            .torrent_source(job.requested_file_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| TorreClouError::TorrentNotFound.to_string())?;

        let profile = self.load_profile(job.storage_profile_id).await?;
        let provider_queue = profile.provider_type.queue_name();

        match self.download_stage.execute(&job, &torrent_source, provider_queue, cancellation).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let retries_remain = task.attempt < task.max_attempts;
                if let Err(classify_err) = self.download_stage.classify_failure(job.id, &e.to_string(), retries_remain).await {
                    tracing::error!(job_id = job.id, error = %classify_err, "could not classify download failure");
                }
                Err(e.to_string())
            }
        }
    }

    /// `googledrive` queue: the Drive resumable-upload stage. A fresh
    /// `DriveStage`/`DriveTransport` is built per task since each job's
    /// profile carries its own OAuth client credentials and refresh token.
    pub async fn handle_drive(&self, task: Task, _cancellation: CancellationToken) -> Result<(), String> {
        let job = self.load_job(task.job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }

        let profile = self.load_profile(job.storage_profile_id).await?;
        let transport = self.drive_transport(&profile).map_err(|e| e.to_string())?;
        let stage = DriveStage::new(
            Arc::new(transport),
            self.job_store.clone(),
            self.transfer_progress.clone(),
            self.progress_cache.clone(),
            self.lease_manager.clone(),
            self.upload_part_size,
        );

        match stage.execute(&job).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let retries_remain = task.attempt < task.max_attempts;
                if let Err(classify_err) = stage.classify_failure(job.id, &e.to_string(), retries_remain).await {
                    tracing::error!(job_id = job.id, error = %classify_err, "could not classify drive upload failure");
                }
                Err(e.to_string())
            }
        }
    }

    /// `s3` queue: the probe-and-handoff upload stage.
    pub async fn handle_s3(&self, task: Task, _cancellation: CancellationToken) -> Result<(), String> {
        let job = self.load_job(task.job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }

        let profile = self.load_profile(job.storage_profile_id).await?;
        match self.s3_stage.execute(&job, &profile).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let retries_remain = task.attempt < task.max_attempts;
                if let Err(classify_err) = self.s3_stage.classify_failure(job.id, &e.to_string(), retries_remain).await {
                    tracing::error!(job_id = job.id, error = %classify_err, "could not classify s3 upload failure");
                }
                Err(e.to_string())
            }
        }
    }

    /// `sync` queue: the canonical S3 multipart mirror. `SyncStage::execute`
    /// already routes its own per-file failures into `SYNC_RETRY` with
    /// backoff, so there is no separate `classify_failure` call here.
    pub async fn handle_sync(&self, task: Task, _cancellation: CancellationToken) -> Result<(), String> {
        let sync_id = task
            .args
            .get("syncId")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| "task is missing syncId".to_string())?;

        let sync = self
            .sync_store
            .load(sync_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("sync {sync_id} not found"))?;
        if sync.status.is_terminal() {
            return Ok(());
        }

        let job = self.load_job(sync.job_id).await?;
        let profile = self.load_profile(job.storage_profile_id).await?;

        self.sync_stage.execute(sync_id, &profile).await.map_err(|e| e.to_string())
    }
}
