//! TransferProgress Store operations (§3, §4.8 step 6).

use sqlx::{Pool, Postgres};
use torreclou_core::ids::{JobId, SyncId};
use torreclou_core::transfer_progress::{PartETag, TransferProgress};

use crate::rows::transfer_progress_from_row;

#[derive(Clone)]
pub struct TransferProgressStore {
    pool: Pool<Postgres>,
}

impl TransferProgressStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn load(
        &self,
        job_id: JobId,
        sync_id: Option<SyncId>,
        local_file_path: &str,
    ) -> anyhow::Result<Option<TransferProgress>> {
        let row = sqlx::query(
            r#"SELECT * FROM transfer_progress WHERE job_id = $1 AND sync_id IS NOT DISTINCT FROM $2 AND local_file_path = $3"#,
        )
        .bind(job_id)
        .bind(sync_id)
        .bind(local_file_path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transfer_progress_from_row).transpose()
    }

    pub async fn list_by_job(&self, job_id: JobId) -> anyhow::Result<Vec<TransferProgress>> {
        let rows = sqlx::query(r#"SELECT * FROM transfer_progress WHERE job_id = $1"#)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transfer_progress_from_row).collect()
    }

    /// Initializes a fresh in-progress row for a file about to be split into
    /// parts (§4.8 step 6 "Initiate a resumable upload session").
    pub async fn start(
        &self,
        job_id: JobId,
        sync_id: Option<SyncId>,
        local_file_path: &str,
        remote_key: &str,
        provider_upload_id: &str,
        part_size: i64,
        total_parts: i32,
        total_bytes: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transfer_progress
                (job_id, sync_id, local_file_path, remote_key, provider_upload_id,
                 part_size, total_parts, total_bytes, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'InProgress')
            ON CONFLICT (job_id, COALESCE(sync_id, 0), local_file_path) DO UPDATE SET
                remote_key = EXCLUDED.remote_key,
                provider_upload_id = EXCLUDED.provider_upload_id,
                part_size = EXCLUDED.part_size,
                total_parts = EXCLUDED.total_parts,
                total_bytes = EXCLUDED.total_bytes,
                status = 'InProgress'
            "#,
        )
        .bind(job_id)
        .bind(sync_id)
        .bind(local_file_path)
        .bind(remote_key)
        .bind(provider_upload_id)
        .bind(part_size)
        .bind(total_parts)
        .bind(total_bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Appends one completed part (§4.8 step 6 "collect {partNumber, etag},
    /// append to TransferProgress, commit, emit progress").
    pub async fn append_part(
        &self,
        job_id: JobId,
        sync_id: Option<SyncId>,
        local_file_path: &str,
        part: PartETag,
        part_bytes: i64,
    ) -> anyhow::Result<()> {
        let existing = self
            .load(job_id, sync_id, local_file_path)
            .await?
            .ok_or_else(|| anyhow::anyhow!("transfer progress row missing for {local_file_path}"))?;

        let mut etags = existing.part_etags;
        etags.push(part);
        let etags_json = serde_json::to_value(&etags)?;

        sqlx::query(
            r#"
            UPDATE transfer_progress SET
                part_etags = $1,
                parts_completed = parts_completed + 1,
                bytes_uploaded = bytes_uploaded + $2,
                last_part_number = $3
            WHERE job_id = $4 AND sync_id IS NOT DISTINCT FROM $5 AND local_file_path = $6
            "#,
        )
        .bind(etags_json)
        .bind(part_bytes)
        .bind(part.part_number)
        .bind(job_id)
        .bind(sync_id)
        .bind(local_file_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §3 invariant: "on Completed the row is deleted or marked terminal" —
    /// we delete, since a completed transfer has no further diagnostic value
    /// once the remote object exists.
    pub async fn complete_and_remove(
        &self,
        job_id: JobId,
        sync_id: Option<SyncId>,
        local_file_path: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"DELETE FROM transfer_progress WHERE job_id = $1 AND sync_id IS NOT DISTINCT FROM $2 AND local_file_path = $3"#,
        )
        .bind(job_id)
        .bind(sync_id)
        .bind(local_file_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// §4.8 step 6 "On failure mid-file: leave TransferProgress in place
    /// with status InProgress for future resume" — still marks it Failed so
    /// diagnostics (Testable Property 10(e)) can distinguish a file that
    /// never finished from one the dispatcher never saw.
    pub async fn mark_failed(
        &self,
        job_id: JobId,
        sync_id: Option<SyncId>,
        local_file_path: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"UPDATE transfer_progress SET status = $1 WHERE job_id = $2 AND sync_id IS NOT DISTINCT FROM $3 AND local_file_path = $4"#,
        )
        .bind("Failed")
        .bind(job_id)
        .bind(sync_id)
        .bind(local_file_path)
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
    async fn resume_after_three_parts_starts_at_part_four(pool: Pool<Postgres>) {
        let job_id = seed_job(&pool).await;
        let store = TransferProgressStore::new(pool);

        store
            .start(job_id, None, "file.iso", "torrents/1/file.iso", "upload-1", 10 * 1024 * 1024, 10, 100 * 1024 * 1024)
            .await
            .unwrap();

        for part_number in 1..=3 {
            store
                .append_part(
                    job_id,
                    None,
                    "file.iso",
                    PartETag { part_number, etag: format!("etag-{part_number}") },
                    10 * 1024 * 1024,
                )
                .await
                .unwrap();
        }

        let progress = store.load(job_id, None, "file.iso").await.unwrap().unwrap();
        assert_eq!(progress.parts_completed, 3);
        assert_eq!(progress.next_part_number(), 4);
        assert!(progress.part_etags_consistent());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn complete_removes_row(pool: Pool<Postgres>) {
        let job_id = seed_job(&pool).await;
        let store = TransferProgressStore::new(pool);
        store
            .start(job_id, None, "a.bin", "k", "u", 1024, 1, 1024)
            .await
            .unwrap();
        store.complete_and_remove(job_id, None, "a.bin").await.unwrap();
        assert!(store.load(job_id, None, "a.bin").await.unwrap().is_none());
    }
}
