//! The external-interface functions: create-and-dispatch-job, cancel-job,
//! retry-job. These are the only entry points anything outside this
//! workspace calls; everything else is driven off the event log and task
//! runtime queues once a job exists.

use torreclou_core::error::TorreClouError;
use torreclou_core::ids::{JobId, RequestedFileId, StorageProfileId, UserId};
use torreclou_core::job::{JobStatus, TransitionSource};
use torreclou_eventlog::{EventLog, JobsStreamEntry};
use torreclou_store::{JobStore, ProfileStore};

/// A caller-supplied role, for privileged cancel/retry access beyond the
/// job's owning user. `None` means "ordinary user".
pub type Role = Option<String>;

const PRIVILEGED_ROLE: &str = "admin";

fn is_privileged(role: &Role) -> bool {
    role.as_deref() == Some(PRIVILEGED_ROLE)
}

pub struct CreateJobResponse {
    pub job_id: JobId,
    pub storage_profile_id: Option<StorageProfileId>,
    pub has_storage_profile_warning: bool,
    pub storage_profile_warning_message: Option<String>,
}

pub struct Api {
    job_store: JobStore,
    profiles: ProfileStore,
    event_log: EventLog,
}

impl Api {
    pub fn new(job_store: JobStore, profiles: ProfileStore, event_log: EventLog) -> Self {
        Self { job_store, profiles, event_log }
    }

    /// `create-and-dispatch-job(requestedFileId, userId, selectedFilePaths,
    /// storageProfileId?)`. The persisted Job row has no nullable fallback
    /// for `storageProfileId`, so an omitted or inactive id resolves against
    /// the caller's profiles instead of failing outright; the resolution is
    /// surfaced back as a warning rather than a validation error.
    pub async fn create_and_dispatch_job(
        &self,
        requested_file_id: RequestedFileId,
        user_id: UserId,
        selected_file_paths: Vec<String>,
        storage_profile_id: Option<StorageProfileId>,
    ) -> Result<CreateJobResponse, TorreClouError> {
        let (resolved_profile_id, warning) = self.resolve_storage_profile(user_id, storage_profile_id).await?;

        let job_id = self
            .job_store
            .create_job(user_id, resolved_profile_id, requested_file_id, selected_file_paths)
            .await?;

        self.event_log
            .append_job(&JobsStreamEntry::new(job_id))
            .await
            .map_err(|e| {
                tracing::error!(job_id, error = %e, "could not append jobs:stream entry for new job");
                TorreClouError::JobNotFound
            })?;

        Ok(CreateJobResponse {
            job_id,
            storage_profile_id: Some(resolved_profile_id),
            has_storage_profile_warning: warning.is_some(),
            storage_profile_warning_message: warning,
        })
    }

    async fn resolve_storage_profile(
        &self,
        user_id: UserId,
        requested: Option<StorageProfileId>,
    ) -> Result<(StorageProfileId, Option<String>), TorreClouError> {
        if let Some(profile_id) = requested {
            let profile = self
                .profiles
                .load(profile_id)
                .await
                .map_err(|_| TorreClouError::ProfileNotFound)?
                .ok_or(TorreClouError::ProfileNotFound)?;

            if profile.user_id != user_id {
                return Err(TorreClouError::AccessDenied);
            }
            if profile.is_active {
                return Ok((profile.id, None));
            }

            let (fallback_id, _) = self.fallback_default_profile(user_id).await?;
            return Ok((
                fallback_id,
                Some("requested storage profile is inactive; used the default profile instead".to_string()),
            ));
        }

        self.fallback_default_profile(user_id).await
    }

    async fn fallback_default_profile(&self, user_id: UserId) -> Result<(StorageProfileId, Option<String>), TorreClouError> {
        let profiles = self
            .profiles
            .list_by_user(user_id)
            .await
            .map_err(|_| TorreClouError::ProfileNotFound)?;

        let default = profiles
            .iter()
            .find(|p| p.is_default && p.is_active)
            .or_else(|| profiles.iter().find(|p| p.is_active));

        match default {
            Some(profile) => Ok((profile.id, None)),
            None => Err(TorreClouError::InvalidProfile),
        }
    }

    /// `cancel-job(jobId, userId, role?) → ok | JobNotCancellable |
    /// JobCompleted | JobCancelled | AccessDenied`. Only non-terminal,
    /// non-upload-finalizing states are cancellable.
    pub async fn cancel_job(&self, job_id: JobId, user_id: UserId, role: Role) -> Result<(), TorreClouError> {
        let job = self
            .job_store
            .load(job_id)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?
            .ok_or(TorreClouError::JobNotFound)?;

        if job.user_id != user_id && !is_privileged(&role) {
            return Err(TorreClouError::AccessDenied);
        }

        match job.status {
            JobStatus::Completed => Err(TorreClouError::JobCompleted),
            JobStatus::Cancelled => Err(TorreClouError::JobCancelled),
            JobStatus::Queued | JobStatus::Downloading | JobStatus::PendingUpload => {
                self.job_store.transition(job_id, JobStatus::Cancelled, TransitionSource::User, None, None).await
            }
            _ => Err(TorreClouError::JobNotCancellable),
        }
    }

    /// `retry-job(jobId, userId, role?) → ok | JobActive | JobRetrying |
    /// JobCompleted | AccessDenied`. Moves a terminally failed job back to
    /// QUEUED with source=User, clears the stale `backgroundTaskId`, and
    /// re-appends to `jobs:stream` so the job dispatcher picks it up again.
    /// The response vocabulary has no code for a cancelled job; the closest
    /// terminal bucket it maps to is `JobCompleted`.
    pub async fn retry_job(&self, job_id: JobId, user_id: UserId, role: Role) -> Result<(), TorreClouError> {
        let job = self
            .job_store
            .load(job_id)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?
            .ok_or(TorreClouError::JobNotFound)?;

        if job.user_id != user_id && !is_privileged(&role) {
            return Err(TorreClouError::AccessDenied);
        }

        match job.status {
            JobStatus::TorrentFailed | JobStatus::UploadFailed | JobStatus::GoogleDriveFailed | JobStatus::Failed => {
                self.job_store.transition(job_id, JobStatus::Queued, TransitionSource::User, None, None).await?;
                self.job_store
                    .clear_background_task_id(job_id)
                    .await
                    .map_err(|_| TorreClouError::JobNotFound)?;
                self.event_log
                    .append_job(&JobsStreamEntry::new(job_id))
                    .await
                    .map_err(|_| TorreClouError::JobNotFound)?;
                Ok(())
            }
            JobStatus::TorrentDownloadRetry | JobStatus::UploadRetry => Err(TorreClouError::JobRetrying),
            JobStatus::Completed | JobStatus::Cancelled => Err(TorreClouError::JobCompleted),
            JobStatus::Queued | JobStatus::Downloading | JobStatus::PendingUpload | JobStatus::Uploading => {
                Err(TorreClouError::JobActive)
            }
        }
    }
}
