//! Job Store operations over the `jobs` / `job_status_history` tables
//! (§4.1). `transition_job` is the one place the Status Engine (§4.2) is
//! actually wired to persistence: legality check, history row, entity
//! update, and commit all happen inside one transaction.

use chrono::Utc;
use serde_json::Value;
use sqlx::{Pool, Postgres};
use torreclou_core::error::TorreClouError;
use torreclou_core::ids::{JobId, RequestedFileId, StorageProfileId, UserId};
use torreclou_core::job::{Job, JobStatus, TransitionSource};
use torreclou_core::status_engine::check_job_transition;

use crate::rows::job_from_row;

#[derive(Clone)]
pub struct JobStore {
    pool: Pool<Postgres>,
}

/// Filters accepted by `list_by_filter` (§4.1 "active, stale, by-user,
/// by-profile").
pub enum JobFilter {
    Active,
    StaleHeartbeat { older_than: chrono::DateTime<Utc> },
    ByUser(UserId),
    ByProfile(StorageProfileId),
}

impl JobStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Creates a Job row in `QUEUED` and its initial StatusHistory entry
    /// (§4.2 "RecordInitial") in one transaction.
    ///
    /// Returns `JobAlreadyExists` if a non-terminal job already exists for
    /// the same `(requestedFileId, userId)` (§6).
    pub async fn create_job(
        &self,
        user_id: UserId,
        storage_profile_id: StorageProfileId,
        requested_file_id: RequestedFileId,
        selected_file_paths: Vec<String>,
    ) -> Result<JobId, TorreClouError> {
        let mut tx = self.pool.begin().await.map_err(|_| TorreClouError::JobNotFound)?;

        let existing: Option<String> = sqlx::query_scalar(
            r#"SELECT status FROM jobs WHERE user_id = $1 AND requested_file_id = $2 ORDER BY id DESC LIMIT 1"#,
        )
        .bind(user_id)
        .bind(requested_file_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|_| TorreClouError::JobNotFound)?;

        if let Some(status_str) = existing {
            if let Some(status) = JobStatus::from_str(&status_str) {
                if !status.is_terminal() {
                    return Err(TorreClouError::JobAlreadyExists);
                }
            }
        }

        let paths_json = Value::from(selected_file_paths);
        let job_id: JobId = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (user_id, storage_profile_id, requested_file_id, status, selected_file_paths)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(storage_profile_id)
        .bind(requested_file_id)
        .bind(JobStatus::Queued.as_str())
        .bind(paths_json)
        .fetch_one(&mut *tx)
        .await
        .map_err(|_| TorreClouError::MissingRequiredFields)?;

        sqlx::query(
            r#"
            INSERT INTO job_status_history (job_id, from_status, to_status, source, error_message, metadata)
            VALUES ($1, NULL, $2, $3, NULL, NULL)
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Queued.as_str())
        .bind("System")
        .execute(&mut *tx)
        .await
        .map_err(|_| TorreClouError::JobNotFound)?;

        tx.commit().await.map_err(|_| TorreClouError::JobNotFound)?;
        Ok(job_id)
    }

    pub async fn load(&self, job_id: JobId) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query(r#"SELECT * FROM jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn list_by_filter(&self, filter: JobFilter) -> anyhow::Result<Vec<Job>> {
        let rows = match filter {
            JobFilter::Active => {
                sqlx::query(
                    r#"SELECT * FROM jobs WHERE status NOT IN
                       ('COMPLETED','FAILED','CANCELLED','TORRENT_FAILED','UPLOAD_FAILED','GOOGLE_DRIVE_FAILED')
                       ORDER BY id"#,
                )
                .fetch_all(&self.pool)
                .await?
            }
            JobFilter::StaleHeartbeat { older_than } => {
                sqlx::query(
                    r#"SELECT * FROM jobs WHERE
                       (last_heartbeat IS NOT NULL AND last_heartbeat < $1)
                       OR (last_heartbeat IS NULL AND started_at IS NOT NULL AND started_at < $1)
                       ORDER BY id"#,
                )
                .bind(older_than)
                .fetch_all(&self.pool)
                .await?
            }
            JobFilter::ByUser(user_id) => {
                sqlx::query(r#"SELECT * FROM jobs WHERE user_id = $1 ORDER BY id DESC"#)
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            JobFilter::ByProfile(profile_id) => {
                sqlx::query(r#"SELECT * FROM jobs WHERE storage_profile_id = $1 ORDER BY id DESC"#)
                    .bind(profile_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(job_from_row).collect()
    }

    /// Applies a status transition through the Status Engine (§4.2): legality
    /// check, history row, entity update, commit — all in one transaction, so
    /// a rejected transition never mutates the row (Testable Property 1).
    pub async fn transition(
        &self,
        job_id: JobId,
        to: JobStatus,
        source: TransitionSource,
        error_message: Option<String>,
        metadata: Option<Value>,
    ) -> Result<(), TorreClouError> {
        let mut tx = self.pool.begin().await.map_err(|_| TorreClouError::JobNotFound)?;

        let row = sqlx::query(r#"SELECT * FROM jobs WHERE id = $1 FOR UPDATE"#)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?
            .ok_or(TorreClouError::JobNotFound)?;
        let job = job_from_row(&row).map_err(|_| TorreClouError::JobNotFound)?;

        check_job_transition(job.status, to, source, error_message.is_some())?;

        let source_str = match source {
            TransitionSource::Worker => "Worker",
            TransitionSource::User => "User",
            TransitionSource::System => "System",
            TransitionSource::Recovery => "Recovery",
        };

        sqlx::query(
            r#"
            INSERT INTO job_status_history (job_id, from_status, to_status, source, error_message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job_id)
        .bind(job.status.as_str())
        .bind(to.as_str())
        .bind(source_str)
        .bind(&error_message)
        .bind(&metadata)
        .execute(&mut *tx)
        .await
        .map_err(|_| TorreClouError::JobNotFound)?;

        let completed_at = if to.is_terminal() { Some(Utc::now()) } else { None };

        sqlx::query(
            r#"
            UPDATE jobs SET status = $1, error_message = COALESCE($2, error_message),
                            completed_at = $3, updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(to.as_str())
        .bind(&error_message)
        .bind(completed_at)
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .map_err(|_| TorreClouError::JobNotFound)?;

        tx.commit().await.map_err(|_| TorreClouError::JobNotFound)?;
        Ok(())
    }

    /// Sets `downloadPath`/`totalBytes`/`startedAt` on first DOWNLOADING
    /// transition (§4.7 step 3). Does not itself change status.
    pub async fn set_download_metadata(
        &self,
        job_id: JobId,
        download_path: &str,
        total_bytes: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                download_path = COALESCE(download_path, $1),
                total_bytes = $2,
                started_at = COALESCE(started_at, now()),
                updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(download_path)
        .bind(total_bytes)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists progress + heartbeat + human label (§4.7 step 7, every 5s).
    pub async fn update_download_progress(
        &self,
        job_id: JobId,
        bytes_downloaded: i64,
        state_label: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET bytes_downloaded = $1, last_heartbeat = now(),
                            current_state_label = $2, updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(bytes_downloaded)
        .bind(state_label)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_heartbeat(&self, job_id: JobId) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE jobs SET last_heartbeat = now(), updated_at = now() WHERE id = $1"#)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_background_task_id(&self, job_id: JobId, task_id: i64) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE jobs SET background_task_id = $1, updated_at = now() WHERE id = $2"#)
            .bind(task_id)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clears `backgroundTaskId` so a re-queued job passes the dispatcher's
    /// idempotency gate again instead of being mistaken for the prior,
    /// already-dispatched attempt.
    pub async fn clear_background_task_id(&self, job_id: JobId) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE jobs SET background_task_id = NULL, updated_at = now() WHERE id = $1"#)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn create_job_writes_initial_history(pool: Pool<Postgres>) {
        let store = JobStore::new(pool.clone());
        let job_id = store.create_job(1, 1, 1, vec![]).await.unwrap();

        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let rows: Vec<(Option<String>, String, String)> = sqlx::query_as(
            r#"SELECT from_status, to_status, source FROM job_status_history WHERE job_id = $1"#,
        )
        .bind(job_id)
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, None);
        assert_eq!(rows[0].1, "QUEUED");
        assert_eq!(rows[0].2, "System");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_nonterminal_job_is_rejected(pool: Pool<Postgres>) {
        let store = JobStore::new(pool);
        store.create_job(1, 1, 42, vec![]).await.unwrap();
        let err = store.create_job(1, 1, 42, vec![]).await.unwrap_err();
        assert_eq!(err, TorreClouError::JobAlreadyExists);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn illegal_transition_does_not_mutate_row(pool: Pool<Postgres>) {
        let store = JobStore::new(pool);
        let job_id = store.create_job(1, 1, 1, vec![]).await.unwrap();

        let err = store
            .transition(job_id, JobStatus::Uploading, TransitionSource::Worker, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TorreClouError::IllegalTransition { .. }));

        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn legal_transition_updates_status_and_history(pool: Pool<Postgres>) {
        let store = JobStore::new(pool.clone());
        let job_id = store.create_job(1, 1, 1, vec![]).await.unwrap();

        store
            .transition(job_id, JobStatus::Downloading, TransitionSource::Worker, None, None)
            .await
            .unwrap();

        let job = store.load(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Downloading);

        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM job_status_history WHERE job_id = $1"#)
            .bind(job_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
