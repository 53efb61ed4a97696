//! Status Engine legality rules (§4.2). Pure, I/O-free: given a current
//! status, a target status, and who is asking, decide whether the
//! transition is legal. `torreclou-store` is the only caller that actually
//! mutates a row; it calls here first, inside the same transaction as the
//! history-row write, so an illegal transition never partially mutates
//! state (Testable Property 1).

use crate::error::TorreClouError;
use crate::job::{JobStatus, TransitionSource};
use crate::sync::SyncStatus;

/// Checks one (from, to, source) triple against the Job legal-transition
/// table in spec §4.2. A no-op transition (`from == to`) is only legal when
/// an error message is attached (§4.2 "(a) rejects a no-op transition unless
/// an error message is attached") — callers pass that through
/// `allow_noop_with_error`.
pub fn check_job_transition(
    from: JobStatus,
    to: JobStatus,
    source: TransitionSource,
    has_error_message: bool,
) -> Result<(), TorreClouError> {
    use JobStatus::*;
    use TransitionSource::*;

    if from == to {
        return if has_error_message {
            Ok(())
        } else {
            illegal(from, to)
        };
    }

    let legal = match (from, to, source) {
        (Queued, Downloading, Worker) => true,
        (Queued, Cancelled, User) => true,

        (Downloading, PendingUpload, Worker) => true,
        (Downloading, TorrentDownloadRetry, Worker) => true,
        (Downloading, TorrentDownloadRetry, Recovery) => true,
        (Downloading, TorrentFailed, Worker) => true,
        (Downloading, Cancelled, User) => true,

        (TorrentDownloadRetry, Downloading, Worker) => true,
        (TorrentDownloadRetry, TorrentFailed, Worker) => true,

        (PendingUpload, Uploading, Worker) => true,
        (PendingUpload, Cancelled, User) => true,

        (Uploading, Completed, Worker) => true,
        (Uploading, UploadRetry, Worker) => true,
        (Uploading, UploadRetry, Recovery) => true,
        (Uploading, UploadFailed, Worker) => true,
        (Uploading, GoogleDriveFailed, Worker) => true,

        (UploadRetry, Uploading, Worker) => true,
        (UploadRetry, UploadFailed, Worker) => true,

        // Any non-terminal status -> FAILED by Recovery after exhaustion.
        (_, Failed, Recovery) if !from.is_terminal() => true,

        // A user may requeue a job that failed terminally; COMPLETED and
        // CANCELLED are not reachable from here since they are not failure
        // outcomes.
        (TorrentFailed, Queued, User) => true,
        (UploadFailed, Queued, User) => true,
        (GoogleDriveFailed, Queued, User) => true,
        (Failed, Queued, User) => true,

        _ => false,
    };

    if legal {
        Ok(())
    } else {
        illegal(from, to)
    }
}

/// Same legality contract, for the Sync state set.
pub fn check_sync_transition(
    from: SyncStatus,
    to: SyncStatus,
    has_error_message: bool,
) -> Result<(), TorreClouError> {
    use SyncStatus::*;

    if from == to {
        return if has_error_message {
            Ok(())
        } else {
            illegal_sync(from, to)
        };
    }

    let legal = match (from, to) {
        (Pending, Syncing) => true,
        (Pending, SyncRetry) => true,
        (SyncRetry, Syncing) => true,
        (Syncing, Completed) => true,
        (Syncing, SyncRetry) => true,
        (Syncing, Failed) => true,
        (SyncRetry, Failed) => true,
        _ => false,
    };

    if legal {
        Ok(())
    } else {
        illegal_sync(from, to)
    }
}

fn illegal(from: JobStatus, to: JobStatus) -> Result<(), TorreClouError> {
    Err(TorreClouError::IllegalTransition {
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    })
}

fn illegal_sync(from: SyncStatus, to: SyncStatus) -> Result<(), TorreClouError> {
    Err(TorreClouError::IllegalTransition {
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_to_downloading_by_worker_is_legal() {
        assert!(check_job_transition(
            JobStatus::Queued,
            JobStatus::Downloading,
            TransitionSource::Worker,
            false
        )
        .is_ok());
    }

    #[test]
    fn queued_to_downloading_by_user_is_illegal() {
        assert!(check_job_transition(
            JobStatus::Queued,
            JobStatus::Downloading,
            TransitionSource::User,
            false
        )
        .is_err());
    }

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::TorrentFailed,
            JobStatus::UploadFailed,
            JobStatus::GoogleDriveFailed,
        ] {
            for target in [JobStatus::Queued, JobStatus::Downloading, JobStatus::Uploading] {
                assert!(
                    check_job_transition(terminal, target, TransitionSource::Recovery, false)
                        .is_err(),
                    "{terminal:?} -> {target:?} should be illegal"
                );
            }
        }
    }

    #[test]
    fn noop_requires_error_message() {
        assert!(check_job_transition(
            JobStatus::Downloading,
            JobStatus::Downloading,
            TransitionSource::Worker,
            false
        )
        .is_err());
        assert!(check_job_transition(
            JobStatus::Downloading,
            JobStatus::Downloading,
            TransitionSource::Worker,
            true
        )
        .is_ok());
    }

    #[test]
    fn recovery_can_fail_any_nonterminal_status() {
        for from in [
            JobStatus::Queued,
            JobStatus::Downloading,
            JobStatus::PendingUpload,
            JobStatus::Uploading,
            JobStatus::TorrentDownloadRetry,
            JobStatus::UploadRetry,
        ] {
            assert!(check_job_transition(from, JobStatus::Failed, TransitionSource::Recovery, false).is_ok());
        }
    }

    #[test]
    fn sync_legal_transitions() {
        assert!(check_sync_transition(SyncStatus::Pending, SyncStatus::Syncing, false).is_ok());
        assert!(check_sync_transition(SyncStatus::Syncing, SyncStatus::Completed, false).is_ok());
        assert!(check_sync_transition(SyncStatus::Completed, SyncStatus::Syncing, false).is_err());
    }

    #[test]
    fn every_illegal_pair_is_rejected_without_mutation() {
        // Testable Property 1: exhaustively confirm no transition not in the
        // table above is accepted, for every (from, to) pair — except the
        // one carve-out below, a user explicitly requeuing a terminally
        // failed job, which is the only way out of a terminal status.
        let all = [
            JobStatus::Queued,
            JobStatus::Downloading,
            JobStatus::PendingUpload,
            JobStatus::Uploading,
            JobStatus::TorrentDownloadRetry,
            JobStatus::UploadRetry,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::TorrentFailed,
            JobStatus::UploadFailed,
            JobStatus::GoogleDriveFailed,
        ];
        let sources = [
            TransitionSource::Worker,
            TransitionSource::User,
            TransitionSource::System,
            TransitionSource::Recovery,
        ];
        let retry_carve_out = |from: JobStatus, to: JobStatus| {
            to == JobStatus::Queued
                && matches!(from, JobStatus::TorrentFailed | JobStatus::UploadFailed | JobStatus::GoogleDriveFailed | JobStatus::Failed)
        };
        for from in all {
            for to in all {
                if from == to || retry_carve_out(from, to) {
                    continue;
                }
                let any_source_legal = sources
                    .iter()
                    .any(|s| check_job_transition(from, to, *s, false).is_ok());
                if from.is_terminal() {
                    assert!(!any_source_legal, "{from:?} is terminal, {to:?} must be unreachable");
                }
            }
        }
    }

    #[test]
    fn user_can_requeue_a_failed_job_but_not_a_completed_or_cancelled_one() {
        for from in [JobStatus::TorrentFailed, JobStatus::UploadFailed, JobStatus::GoogleDriveFailed, JobStatus::Failed] {
            assert!(check_job_transition(from, JobStatus::Queued, TransitionSource::User, false).is_ok());
        }
        for from in [JobStatus::Completed, JobStatus::Cancelled] {
            assert!(check_job_transition(from, JobStatus::Queued, TransitionSource::User, false).is_err());
        }
    }
}
