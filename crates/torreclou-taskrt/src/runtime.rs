//! Durable task storage and the per-queue worker pool that drains it
//! (§4.6). Durable state lives in the `tasks` table of the same Postgres
//! database the Job Store uses, so a worker-process crash can never lose a
//! task a Job's lifecycle depends on — an in-memory queue would defeat the
//! crash-recovery requirement in §5.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Pool, Postgres};
use tokio_util::sync::CancellationToken;

use crate::task::{delay_for_attempt, Task, TaskDescriptor, TaskState};

/// The state-election hook (§4.6, §9 "the state-election hook is an
/// `OnTaskFailed(jobId, err)` callback registered with the runtime"). Kept
/// as a trait rather than a direct dependency on `torreclou-store` so the
/// runtime stays a reusable, domain-agnostic component; `torreclou-worker`
/// wires a `JobStore`-backed implementation at startup.
#[async_trait]
pub trait TaskFailureHook: Send + Sync {
    async fn on_task_failed(&self, job_id: i64, error_message: &str);
}

/// A hook that does nothing, for callers/tests that don't need it wired.
pub struct NoopFailureHook;

#[async_trait]
impl TaskFailureHook for NoopFailureHook {
    async fn on_task_failed(&self, _job_id: i64, _error_message: &str) {}
}

#[derive(Clone)]
pub struct TaskRuntime {
    pool: Pool<Postgres>,
    retry_delays: Vec<Duration>,
    hook: Arc<dyn TaskFailureHook>,
    /// Per-task cancellation tokens (§4.6 "Per-task cancellation token
    /// propagated into user code"), registered for the lifetime of one
    /// `Processing` attempt.
    cancellation: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl TaskRuntime {
    pub fn new(pool: Pool<Postgres>, retry_delays: Vec<Duration>, hook: Arc<dyn TaskFailureHook>) -> Self {
        Self { pool, retry_delays, hook, cancellation: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Enqueues a task descriptor. Returns the new task's id, the opaque
    /// `backgroundTaskId` handle persisted onto the Job/Sync row.
    pub async fn enqueue(&self, desc: TaskDescriptor) -> anyhow::Result<i64> {
        self.schedule(desc, Utc::now()).await
    }

    /// Like `enqueue`, but the task is not due (`state = 'Scheduled'`) until
    /// `run_at`. The Recovery Supervisor uses this to apply its backoff
    /// (§4.10) to a re-dispatched task instead of hammering a failing
    /// provider immediately.
    pub async fn schedule(&self, desc: TaskDescriptor, run_at: chrono::DateTime<Utc>) -> anyhow::Result<i64> {
        let state = if run_at <= Utc::now() { "Enqueued" } else { "Scheduled" };
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tasks (queue, job_id, args, state, attempt, max_attempts, run_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&desc.queue)
        .bind(desc.job_id)
        .bind(&desc.args)
        .bind(state)
        .bind(desc.max_attempts)
        .bind(run_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Claims the next due task from `queue` for this worker, atomically
    /// transitioning it to `Processing` and incrementing its attempt count.
    /// `SELECT ... FOR UPDATE SKIP LOCKED` gives the "multiple tasks from
    /// the same queue execute in parallel, across processes" concurrency
    /// model of §4.6/§5 without a separate broker.
    pub async fn claim_next(&self, queue: &str) -> anyhow::Result<Option<Task>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, queue, job_id, args, state, attempt, max_attempts, run_at, last_error
            FROM tasks
            WHERE queue = $1 AND state IN ('Enqueued', 'Scheduled') AND run_at <= now()
            ORDER BY run_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(r#"UPDATE tasks SET state = 'Processing', attempt = attempt + 1, updated_at = now() WHERE id = $1"#)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let task = row.into_task(row.attempt + 1);
        self.cancellation.lock().unwrap().insert(task.id, CancellationToken::new());
        Ok(Some(task))
    }

    /// Cancellation token for a currently-processing task, if any. The
    /// Status Engine's `CANCELLED` transition (§5 "Cancellation and
    /// timeouts") triggers the caller to look this up and call `.cancel()`.
    pub fn cancellation_token(&self, task_id: i64) -> Option<CancellationToken> {
        self.cancellation.lock().unwrap().get(&task_id).cloned()
    }

    pub async fn complete(&self, task_id: i64) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE tasks SET state = 'Succeeded', updated_at = now() WHERE id = $1"#)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        self.cancellation.lock().unwrap().remove(&task_id);
        Ok(())
    }

    /// Records a failed attempt. If attempts remain, reschedules at the
    /// configured backoff (§4.6 default `60s, 300s, 900s`); once exhausted,
    /// ends the attempt lifecycle in `Failed` and fires the state-election
    /// hook (§4.6 "the hook reads the job id from task arguments and marks
    /// the corresponding Job FAILED ... if the Job is not already
    /// terminal" — terminality is `torreclou-store`'s job to check, since
    /// this crate has no knowledge of Job status).
    pub async fn fail(&self, task_id: i64, error_message: &str) -> anyhow::Result<()> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"SELECT id, queue, job_id, args, state, attempt, max_attempts, run_at, last_error FROM tasks WHERE id = $1"#,
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;

        self.cancellation.lock().unwrap().remove(&task_id);

        if row.attempt >= row.max_attempts {
            sqlx::query(r#"UPDATE tasks SET state = 'Failed', last_error = $1, updated_at = now() WHERE id = $2"#)
                .bind(error_message)
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            self.hook.on_task_failed(row.job_id, error_message).await;
        } else {
            let delay = delay_for_attempt(&self.retry_delays, row.attempt);
            let run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            sqlx::query(
                r#"UPDATE tasks SET state = 'Scheduled', run_at = $1, last_error = $2, updated_at = now() WHERE id = $3"#,
            )
            .bind(run_at)
            .bind(error_message)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn load(&self, task_id: i64) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"SELECT id, queue, job_id, args, state, attempt, max_attempts, run_at, last_error FROM tasks WHERE id = $1"#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            let attempt = r.attempt;
            r.into_task(attempt)
        }))
    }

    /// Runs a bounded worker pool for one queue: `concurrency` tasks from
    /// `queue` run in parallel (§4.6 "the runtime may execute multiple tasks
    /// from the same queue in parallel"), looping until cancelled.
    pub async fn run_worker_pool<F, Fut>(
        &self,
        queue: &str,
        concurrency: usize,
        shutdown: CancellationToken,
        handler: F,
    ) where
        F: Fn(Task, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let mut set = tokio::task::JoinSet::new();

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            while set.len() < concurrency {
                match self.claim_next(queue).await {
                    Ok(Some(task)) => {
                        let token = self.cancellation_token(task.id).unwrap_or_default();
                        let runtime = self.clone();
                        let handler = Arc::clone(&handler);
                        let task_id = task.id;
                        set.spawn(async move {
                            let result = handler(task, token).await;
                            match result {
                                Ok(()) => {
                                    let _ = runtime.complete(task_id).await;
                                }
                                Err(e) => {
                                    let _ = runtime.fail(task_id, &e).await;
                                }
                            }
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, queue, "failed to claim task");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                Some(_) = set.join_next(), if !set.is_empty() => {}
            }
        }

        while set.join_next().await.is_some() {}
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    queue: String,
    job_id: i64,
    args: Value,
    state: String,
    attempt: i32,
    max_attempts: i32,
    run_at: chrono::DateTime<Utc>,
    last_error: Option<String>,
}

impl TaskRow {
    fn into_task(self, attempt: i32) -> Task {
        Task {
            id: self.id,
            queue: self.queue,
            job_id: self.job_id,
            args: self.args,
            state: TaskState::from_str(&self.state).unwrap_or(TaskState::Failed),
            attempt,
            max_attempts: self.max_attempts,
            run_at: self.run_at,
            last_error: self.last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../torreclou-store/migrations")]
    async fn enqueue_then_claim_marks_processing(pool: Pool<Postgres>) {
        seed_job(&pool).await;
        let rt = TaskRuntime::new(pool, crate::task::default_retry_delays(), Arc::new(NoopFailureHook));
        let id = rt
            .enqueue(TaskDescriptor { queue: "torrents".into(), job_id: 1, args: serde_json::json!({}), max_attempts: 3 })
            .await
            .unwrap();

        let task = rt.claim_next("torrents").await.unwrap().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.attempt, 1);
        assert!(rt.claim_next("torrents").await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "../torreclou-store/migrations")]
    async fn fail_reschedules_until_attempts_exhausted(pool: Pool<Postgres>) {
        seed_job(&pool).await;
        let rt = TaskRuntime::new(pool, crate::task::default_retry_delays(), Arc::new(NoopFailureHook));
        let id = rt
            .enqueue(TaskDescriptor { queue: "torrents".into(), job_id: 1, args: serde_json::json!({}), max_attempts: 2 })
            .await
            .unwrap();

        rt.claim_next("torrents").await.unwrap();
        rt.fail(id, "boom").await.unwrap();
        let task = rt.load(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Scheduled);

        // exhaust the second attempt
        rt.claim_next("torrents").await.unwrap();
        rt.fail(id, "boom again").await.unwrap();
        let task = rt.load(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Failed);
    }

    async fn seed_job(pool: &Pool<Postgres>) {
        sqlx::query(
            r#"INSERT INTO jobs (id, user_id, storage_profile_id, requested_file_id, status) VALUES (1, 1, 1, 1, 'QUEUED')"#,
        )
        .execute(pool)
        .await
        .unwrap();
    }
}
