//! The task runtime's state-election hook, wired to the Job Store: once a
//! task exhausts its attempts the hook is the safety net that marks the Job
//! `FAILED`, unless it is already terminal (e.g. a `*_FAILED` transition the
//! stage itself already applied before re-raising).

use async_trait::async_trait;
use torreclou_core::job::{JobStatus, TransitionSource};
use torreclou_store::jobs::JobStore;
use torreclou_taskrt::TaskFailureHook;

pub struct JobFailureHook {
    job_store: JobStore,
}

impl JobFailureHook {
    pub fn new(job_store: JobStore) -> Self {
        Self { job_store }
    }
}

#[async_trait]
impl TaskFailureHook for JobFailureHook {
    async fn on_task_failed(&self, job_id: i64, error_message: &str) {
        let job = match self.job_store.load(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id, "failure hook fired for unknown job");
                return;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "failure hook could not load job");
                return;
            }
        };

        if job.status.is_terminal() {
            return;
        }

        if let Err(e) = self
            .job_store
            .transition(job_id, JobStatus::Failed, TransitionSource::Recovery, Some(error_message.to_string()), None)
            .await
        {
            tracing::error!(job_id, error = %e, "failure hook could not mark job failed");
        }
    }
}
