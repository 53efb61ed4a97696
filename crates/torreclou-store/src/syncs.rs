//! Sync Store operations over the `syncs` / `sync_status_history` tables.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use torreclou_core::error::TorreClouError;
use torreclou_core::ids::{JobId, SyncId};
use torreclou_core::job::TransitionSource;
use torreclou_core::sync::{Sync, SyncStatus};
use torreclou_core::status_engine::check_sync_transition;

use crate::rows::sync_from_row;

#[derive(Clone)]
pub struct SyncStore {
    pool: Pool<Postgres>,
}

impl SyncStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Creates the Sync row for a job the first time it reaches
    /// `PENDING_UPLOAD` on an S3 profile (§3 invariant). Idempotent: if a
    /// Sync row already exists for this job, returns it instead of erroring.
    pub async fn get_or_create(
        &self,
        job_id: JobId,
        local_file_path: &str,
        s3_key_prefix: &str,
    ) -> anyhow::Result<Sync> {
        if let Some(existing) = self.load_by_job(job_id).await? {
            return Ok(existing);
        }

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO syncs (job_id, status, local_file_path, s3_key_prefix)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO UPDATE SET job_id = EXCLUDED.job_id
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(SyncStatus::Pending.as_str())
        .bind(local_file_path)
        .bind(s3_key_prefix)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        sync_from_row(&row)
    }

    pub async fn load(&self, sync_id: SyncId) -> anyhow::Result<Option<Sync>> {
        let row = sqlx::query(r#"SELECT * FROM syncs WHERE id = $1"#)
            .bind(sync_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(sync_from_row).transpose()
    }

    pub async fn load_by_job(&self, job_id: JobId) -> anyhow::Result<Option<Sync>> {
        let row = sqlx::query(r#"SELECT * FROM syncs WHERE job_id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(sync_from_row).transpose()
    }

    /// All non-terminal syncs, for the Recovery Supervisor's scan (§4.10) —
    /// broader than `list_retry_due`, which only covers one of its three
    /// candidate classes.
    pub async fn list_active(&self) -> anyhow::Result<Vec<Sync>> {
        let rows = sqlx::query(r#"SELECT * FROM syncs WHERE status NOT IN ('COMPLETED', 'FAILED') ORDER BY id"#)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(sync_from_row).collect()
    }

    pub async fn list_retry_due(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Sync>> {
        let rows = sqlx::query(
            r#"SELECT * FROM syncs WHERE status = 'SYNC_RETRY' AND (next_retry_at IS NULL OR next_retry_at <= $1)
               ORDER BY id"#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(sync_from_row).collect()
    }

    /// Status Engine wiring for Sync entities, mirroring `JobStore::transition`.
    pub async fn transition(
        &self,
        sync_id: SyncId,
        to: SyncStatus,
        source: TransitionSource,
        error_message: Option<String>,
    ) -> Result<(), TorreClouError> {
        let mut tx = self.pool.begin().await.map_err(|_| TorreClouError::JobNotFound)?;

        let row = sqlx::query(r#"SELECT * FROM syncs WHERE id = $1 FOR UPDATE"#)
            .bind(sync_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?
            .ok_or(TorreClouError::JobNotFound)?;
        let sync = sync_from_row(&row).map_err(|_| TorreClouError::JobNotFound)?;

        check_sync_transition(sync.status, to, error_message.is_some())?;

        let source_str = match source {
            TransitionSource::Worker => "Worker",
            TransitionSource::User => "User",
            TransitionSource::System => "System",
            TransitionSource::Recovery => "Recovery",
        };

        sqlx::query(
            r#"
            INSERT INTO sync_status_history (sync_id, from_status, to_status, source, error_message)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(sync_id)
        .bind(sync.status.as_str())
        .bind(to.as_str())
        .bind(source_str)
        .bind(&error_message)
        .execute(&mut *tx)
        .await
        .map_err(|_| TorreClouError::JobNotFound)?;

        let completed_at = if to.is_terminal() { Some(Utc::now()) } else { sync.completed_at };

        sqlx::query(
            r#"
            UPDATE syncs SET status = $1, error_message = COALESCE($2, error_message),
                             completed_at = $3, updated_at = now()
            WHERE id = $4
            "#,
        )
        .bind(to.as_str())
        .bind(&error_message)
        .bind(completed_at)
        .bind(sync_id)
        .execute(&mut *tx)
        .await
        .map_err(|_| TorreClouError::JobNotFound)?;

        tx.commit().await.map_err(|_| TorreClouError::JobNotFound)?;
        Ok(())
    }

    /// Records `startedAt` the first time a Sync reaches `SYNCING`
    /// (§4.9 step 2). A no-op on later calls since `COALESCE` keeps the
    /// original value.
    pub async fn set_started_at(&self, sync_id: SyncId) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE syncs SET started_at = COALESCE(started_at, now()), updated_at = now() WHERE id = $1"#)
            .bind(sync_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Recovery's backoff write (§4.9 step 6, §4.10): `retryCount += 1`,
    /// `nextRetryAt = now + 5min * retryCount`.
    pub async fn bump_retry(&self, sync_id: SyncId) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE syncs SET
                retry_count = retry_count + 1,
                next_retry_at = now() + (5 * (retry_count + 1) || ' minutes')::interval,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(sync_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recovery's own backoff write (§4.10), distinct from `bump_retry`'s
    /// per-file-failure formula (§4.9 step 6): the Supervisor computes
    /// `nextRetryAt` itself and just needs it persisted alongside the bump.
    pub async fn apply_recovery_backoff(&self, sync_id: SyncId, next_retry_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE syncs SET retry_count = retry_count + 1, next_retry_at = $1, updated_at = now() WHERE id = $2"#,
        )
        .bind(next_retry_at)
        .bind(sync_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_progress(
        &self,
        sync_id: SyncId,
        bytes_synced: i64,
        files_synced: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE syncs SET bytes_synced = $1, files_synced = $2, last_heartbeat = now(), updated_at = now()
            WHERE id = $3
            "#,
        )
        .bind(bytes_synced)
        .bind(files_synced)
        .bind(sync_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_totals(&self, sync_id: SyncId, files_total: i64, total_bytes: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE syncs SET files_total = $1, total_bytes = $2, updated_at = now() WHERE id = $3"#,
        )
        .bind(files_total)
        .bind(total_bytes)
        .bind(sync_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_background_task_id(&self, sync_id: SyncId, task_id: i64) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE syncs SET background_task_id = $1, updated_at = now() WHERE id = $2"#)
            .bind(task_id)
            .bind(sync_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStore;

    async fn seed_job(pool: &Pool<Postgres>) -> JobId {
        JobStore::new(pool.clone()).create_job(1, 1, 1, vec![]).await.unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn get_or_create_is_idempotent(pool: Pool<Postgres>) {
        let job_id = seed_job(&pool).await;
        let store = SyncStore::new(pool);
        let a = store.get_or_create(job_id, "/data/1", "torrents/1").await.unwrap();
        let b = store.get_or_create(job_id, "/data/1", "torrents/1").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn bump_retry_advances_backoff(pool: Pool<Postgres>) {
        let job_id = seed_job(&pool).await;
        let store = SyncStore::new(pool);
        let sync = store.get_or_create(job_id, "/data/1", "torrents/1").await.unwrap();
        store.bump_retry(sync.id).await.unwrap();
        let reloaded = store.load(sync.id).await.unwrap().unwrap();
        assert_eq!(reloaded.retry_count, 1);
        assert!(reloaded.next_retry_at.is_some());
    }
}
