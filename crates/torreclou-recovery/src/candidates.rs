//! Pure candidate-detection predicates (§4.10), separated from the scan
//! loop and the store so the three bullet conditions are unit-testable
//! without a database.

use chrono::{DateTime, Utc};
use torreclou_core::job::{Job, JobStatus};
use torreclou_core::sync::{Sync, SyncStatus};

fn is_stale(last_heartbeat: Option<DateTime<Utc>>, started_at: Option<DateTime<Utc>>, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
    match (last_heartbeat, started_at) {
        (Some(heartbeat), _) => heartbeat < now - threshold,
        (None, Some(started)) => started < now - threshold,
        (None, None) => false,
    }
}

/// One of §4.10's three candidate classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Retry state with `nextRetryAt` null or due.
    RetryDue,
    /// In-progress state with a stale heartbeat.
    StaleHeartbeat,
    /// Pending/queued, no background task, stale `startedAt`.
    StalePending,
}

pub fn job_candidate(job: &Job, now: DateTime<Utc>, heartbeat_threshold: chrono::Duration) -> Option<CandidateKind> {
    match job.status {
        JobStatus::TorrentDownloadRetry | JobStatus::UploadRetry => Some(CandidateKind::RetryDue),
        JobStatus::Downloading | JobStatus::Uploading => {
            is_stale(job.last_heartbeat, job.started_at, now, heartbeat_threshold).then_some(CandidateKind::StaleHeartbeat)
        }
        JobStatus::Queued | JobStatus::PendingUpload => {
            if job.background_task_id.is_some() {
                return None;
            }
            is_stale(None, job.started_at.or(Some(job.created_at)), now, heartbeat_threshold).then_some(CandidateKind::StalePending)
        }
        _ => None,
    }
}

pub fn sync_candidate(sync: &Sync, now: DateTime<Utc>, heartbeat_threshold: chrono::Duration) -> Option<CandidateKind> {
    match sync.status {
        SyncStatus::SyncRetry => {
            if sync.next_retry_at.map(|t| t <= now).unwrap_or(true) {
                Some(CandidateKind::RetryDue)
            } else {
                None
            }
        }
        SyncStatus::Syncing => {
            is_stale(sync.last_heartbeat, sync.started_at, now, heartbeat_threshold).then_some(CandidateKind::StaleHeartbeat)
        }
        SyncStatus::Pending => {
            if sync.background_task_id.is_some() {
                return None;
            }
            is_stale(None, sync.started_at.or(Some(sync.created_at)), now, heartbeat_threshold).then_some(CandidateKind::StalePending)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job() -> Job {
        Job {
            id: 1,
            user_id: 1,
            storage_profile_id: 1,
            requested_file_id: 1,
            status: JobStatus::Downloading,
            selected_file_paths: vec![],
            download_path: None,
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

    #[test]
    fn retry_state_is_always_a_candidate() {
        let job = Job { status: JobStatus::TorrentDownloadRetry, ..base_job() };
        let now = Utc::now();
        assert_eq!(job_candidate(&job, now, chrono::Duration::minutes(5)), Some(CandidateKind::RetryDue));
    }

    #[test]
    fn fresh_heartbeat_is_not_a_candidate() {
        let now = Utc::now();
        let job = Job { status: JobStatus::Downloading, last_heartbeat: Some(now), ..base_job() };
        assert_eq!(job_candidate(&job, now, chrono::Duration::minutes(5)), None);
    }

    #[test]
    fn stale_heartbeat_is_a_candidate() {
        let now = Utc::now();
        let job = Job {
            status: JobStatus::Downloading,
            last_heartbeat: Some(now - chrono::Duration::minutes(10)),
            ..base_job()
        };
        assert_eq!(job_candidate(&job, now, chrono::Duration::minutes(5)), Some(CandidateKind::StaleHeartbeat));
    }

    #[test]
    fn queued_with_background_task_is_not_a_candidate() {
        let now = Utc::now();
        let job = Job {
            status: JobStatus::Queued,
            background_task_id: Some(9),
            created_at: now - chrono::Duration::minutes(30),
            ..base_job()
        };
        assert_eq!(job_candidate(&job, now, chrono::Duration::minutes(5)), None);
    }

    #[test]
    fn terminal_status_is_never_a_candidate() {
        let now = Utc::now();
        let job = Job { status: JobStatus::Completed, ..base_job() };
        assert_eq!(job_candidate(&job, now, chrono::Duration::minutes(5)), None);
    }
}
