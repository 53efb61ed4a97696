//! The Recovery Supervisor (§4.10): a single periodic scan loop per worker
//! process that finds stuck Jobs/Syncs and re-dispatches them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

use torreclou_core::job::{Job, JobStatus, TransitionSource};
use torreclou_core::provider::StorageProfile;
use torreclou_core::sync::{Sync, SyncStatus};
use torreclou_store::jobs::{JobFilter, JobStore};
use torreclou_store::syncs::SyncStore;
use torreclou_taskrt::task::{Task, TaskDescriptor, TaskState};
use torreclou_taskrt::TaskRuntime;

use crate::backoff::next_retry_at;
use crate::candidates::{job_candidate, sync_candidate, CandidateKind};
use crate::routing::{job_queue, sync_queue};

/// Read-only access to the (externally owned) StorageProfile reference
/// entity, kept as a trait so this crate never depends on whatever
/// repository the hosting collaborator actually uses (§9 "Cyclic navigation
/// ... collapsed ... everything else is a read-only reference by id loaded
/// via the repository interface").
#[async_trait]
pub trait StorageProfileLookup: Send + Sync {
    async fn load(&self, profile_id: i64) -> anyhow::Result<Option<StorageProfile>>;
}

pub struct RecoverySupervisor<P: StorageProfileLookup> {
    job_store: JobStore,
    sync_store: SyncStore,
    task_runtime: TaskRuntime,
    profiles: Arc<P>,
    heartbeat_threshold: ChronoDuration,
    scan_interval: Duration,
    task_max_attempts: i32,
}

impl<P: StorageProfileLookup> RecoverySupervisor<P> {
    pub fn new(
        job_store: JobStore,
        sync_store: SyncStore,
        task_runtime: TaskRuntime,
        profiles: Arc<P>,
        heartbeat_threshold: Duration,
        scan_interval: Duration,
        task_max_attempts: i32,
    ) -> Self {
        Self {
            job_store,
            sync_store,
            task_runtime,
            profiles,
            heartbeat_threshold: ChronoDuration::from_std(heartbeat_threshold).unwrap_or_else(|_| ChronoDuration::minutes(5)),
            scan_interval,
            task_max_attempts,
        }
    }

    /// Runs the scan loop until `shutdown` fires (§5 "The Recovery Supervisor
    /// is a single parallel loop per process").
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.scan_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    if let Err(e) = self.scan_once().await {
                        tracing::error!(error = %e, "recovery scan failed");
                    }
                }
            }
        }
    }

    /// One scan pass, exposed separately from `run` so tests and an
    /// on-demand admin trigger can call it without waiting out the interval.
    pub async fn scan_once(&self) -> anyhow::Result<()> {
        let now = Utc::now();

        let jobs = self.job_store.list_by_filter(JobFilter::Active).await?;
        for job in &jobs {
            if let Some(kind) = job_candidate(job, now, self.heartbeat_threshold) {
                if let Err(e) = self.recover_job(job, kind, now).await {
                    tracing::warn!(job_id = job.id, error = %e, "job recovery attempt failed");
                }
            }
        }

        let syncs = self.sync_store.list_active().await?;
        for sync in &syncs {
            if let Some(kind) = sync_candidate(sync, now, self.heartbeat_threshold) {
                if let Err(e) = self.recover_sync(sync, kind, now).await {
                    tracing::warn!(sync_id = sync.id, error = %e, "sync recovery attempt failed");
                }
            }
        }

        Ok(())
    }

    /// Consults the task runtime's monitoring view for an existing
    /// `backgroundTaskId` (§4.10): `None` means "skip, do not duplicate";
    /// `Some(attempt)` means "recover", carrying the attempt count to feed
    /// the backoff formula as a retry-count proxy.
    async fn consult_task(&self, task_id: i64) -> anyhow::Result<Option<i32>> {
        match self.task_runtime.load(task_id).await? {
            None => Ok(Some(1)),
            Some(Task { state, attempt, .. }) => match state {
                TaskState::Enqueued | TaskState::Scheduled => Ok(None),
                TaskState::Processing | TaskState::Failed | TaskState::Deleted | TaskState::Succeeded => {
                    Ok(Some(attempt.max(1)))
                }
            },
        }
    }

    async fn recover_job(&self, job: &Job, kind: CandidateKind, now: DateTime<Utc>) -> anyhow::Result<()> {
        let retry_count = match job.background_task_id {
            Some(task_id) => match self.consult_task(task_id).await? {
                Some(attempt) => attempt,
                None => return Ok(()),
            },
            None => 1,
        };

        let profile = self
            .profiles
            .load(job.storage_profile_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("storage profile {} not found for job {}", job.storage_profile_id, job.id))?;

        let retry_status = match (kind, job.status) {
            (CandidateKind::StaleHeartbeat, JobStatus::Downloading) => Some(JobStatus::TorrentDownloadRetry),
            (CandidateKind::StaleHeartbeat, JobStatus::Uploading) => Some(JobStatus::UploadRetry),
            _ => None,
        };

        if let Some(to) = retry_status {
            self.job_store
                .transition(job.id, to, TransitionSource::Recovery, Some("recovered: stale heartbeat".to_string()), None)
                .await?;
        }

        let routing_status = retry_status.unwrap_or(job.status);
        let queue = job_queue(routing_status, profile.provider_type);
        let args = build_job_task_args(queue, job);
        let next_retry = next_retry_at(retry_count, now);

        let task_id = self
            .task_runtime
            .schedule(
                TaskDescriptor { queue: queue.to_string(), job_id: job.id, args, max_attempts: self.task_max_attempts },
                next_retry,
            )
            .await?;

        self.job_store.set_background_task_id(job.id, task_id).await?;
        tracing::info!(job_id = job.id, queue, retry_count, next_retry = %next_retry, "recovery re-dispatched job");
        Ok(())
    }

    async fn recover_sync(&self, sync: &Sync, kind: CandidateKind, now: DateTime<Utc>) -> anyhow::Result<()> {
        let retry_count = match sync.background_task_id {
            Some(task_id) => match self.consult_task(task_id).await? {
                Some(attempt) => attempt,
                None => return Ok(()),
            },
            None => 1,
        };

        if matches!(kind, CandidateKind::StaleHeartbeat) {
            self.sync_store
                .transition(sync.id, SyncStatus::SyncRetry, TransitionSource::Recovery, Some("recovered: stale heartbeat".to_string()))
                .await?;
        }

        let next_retry = next_retry_at(retry_count, now);
        self.sync_store.apply_recovery_backoff(sync.id, next_retry).await?;

        let queue = sync_queue(sync.status);
        let args = serde_json::json!({ "jobId": sync.job_id, "syncId": sync.id });

        let task_id = self
            .task_runtime
            .schedule(
                TaskDescriptor { queue: queue.to_string(), job_id: sync.job_id, args, max_attempts: self.task_max_attempts },
                next_retry,
            )
            .await?;

        self.sync_store.set_background_task_id(sync.id, task_id).await?;
        tracing::info!(sync_id = sync.id, queue, retry_count, next_retry = %next_retry, "recovery re-dispatched sync");
        Ok(())
    }
}

/// Mirrors the JSON shape the normal stream dispatcher would have built for
/// this queue (§6 "Durable streams (wire)"), so a queue's task handler can't
/// tell a Recovery-originated task from a dispatcher-originated one.
fn build_job_task_args(queue: &str, job: &Job) -> serde_json::Value {
    if queue == "torrents" {
        serde_json::json!({ "jobId": job.id })
    } else {
        serde_json::json!({
            "jobId": job.id,
            "downloadPath": job.download_path,
            "storageProfileId": job.storage_profile_id,
            "userId": job.user_id,
            "createdAt": job.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torrents_queue_args_are_job_id_only() {
        let job = sample_job();
        let args = build_job_task_args("torrents", &job);
        assert_eq!(args, serde_json::json!({ "jobId": 1 }));
    }

    #[test]
    fn provider_queue_args_carry_upload_fields() {
        let job = sample_job();
        let args = build_job_task_args("googledrive", &job);
        assert_eq!(args["jobId"], 1);
        assert_eq!(args["storageProfileId"], 7);
    }

    fn sample_job() -> Job {
        Job {
            id: 1,
            user_id: 2,
            storage_profile_id: 7,
            requested_file_id: 3,
            status: JobStatus::Uploading,
            selected_file_paths: vec![],
            download_path: Some("/data/1".to_string()),
            bytes_downloaded: 0,
            total_bytes: 0,
            started_at: None,
            completed_at: None,
            last_heartbeat: None,
            background_task_id: None,
            error_message: None,
            current_state_label: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
