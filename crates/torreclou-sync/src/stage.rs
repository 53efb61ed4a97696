//! Sync Stage (§4.9): mirrors `downloadPath` into the user's bucket using
//! the canonical S3 multipart transport, then deletes the local directory.

use std::time::{Duration, Instant};

use torreclou_core::error::TorreClouError;
use torreclou_core::ids::{JobId, SyncId};
use torreclou_core::job::TransitionSource;
use torreclou_core::provider::StorageProfile;
use torreclou_core::sync::SyncStatus;
use torreclou_s3transport::{
    build_s3_target, complete_multipart, initiate_multipart, object_exists, total_parts, upload_part_from_file, S3Target,
};
use torreclou_store::syncs::SyncStore;
use torreclou_store::transfer_progress::TransferProgressStore;

use crate::files::{enumerate_files, s3_key, LocalFile};

#[derive(Debug, thiserror::Error)]
pub enum SyncStageError {
    #[error("transport error: {0}")]
    Transport(#[from] TorreClouError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct SyncStage {
    sync_store: SyncStore,
    transfer_progress: TransferProgressStore,
    part_size: i64,
}

impl SyncStage {
    pub fn new(sync_store: SyncStore, transfer_progress: TransferProgressStore, part_size: i64) -> Self {
        Self { sync_store, transfer_progress, part_size }
    }

    /// Runs §4.9 steps 1-6 for one sync. `profile` supplies the destination
    /// bucket.
    pub async fn execute(&self, sync_id: SyncId, profile: &StorageProfile) -> Result<(), SyncStageError> {
        // Step 1: load, accept only PENDING or SYNC_RETRY.
        let sync = self
            .sync_store
            .load(sync_id)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?
            .ok_or(TorreClouError::JobNotFound)?;

        if !matches!(sync.status, SyncStatus::Pending | SyncStatus::SyncRetry) {
            return Ok(());
        }
        let job_id = sync.job_id;

        // Step 2: transition to SYNCING, record startedAt.
        self.sync_store.transition(sync_id, SyncStatus::Syncing, TransitionSource::Worker, None).await?;
        self.sync_store.set_started_at(sync_id).await.map_err(|_| TorreClouError::JobNotFound)?;

        // Step 3: enumerate files, compute totals.
        let files = enumerate_files(&sync.local_file_path).await?;
        if sync.files_total == 0 {
            let total_bytes: i64 = files.iter().map(|f| f.size).sum();
            self.sync_store
                .set_totals(sync_id, files.len() as i64, total_bytes)
                .await
                .map_err(|_| TorreClouError::JobNotFound)?;
        }

        let target = build_s3_target(&profile.credentials_json)?;

        // Step 4: upload each file from index filesSynced onward.
        let mut bytes_synced = sync.bytes_synced;
        let mut files_synced = sync.files_synced;
        let mut last_progress_write = Instant::now() - Duration::from_secs(11);

        for (index, file) in files.iter().enumerate() {
            if (index as i64) < sync.files_synced {
                continue;
            }

            let key = s3_key(&sync.s3_key_prefix, &file.relative_path);

            if let Err(e) = self.upload_one_file(job_id, sync_id, &target, &key, file).await {
                // Step 6: per-file failure -> SYNC_RETRY with bounded backoff.
                self.sync_store
                    .transition(sync_id, SyncStatus::SyncRetry, TransitionSource::Worker, Some(e.to_string()))
                    .await?;
                self.sync_store.bump_retry(sync_id).await.map_err(|_| TorreClouError::JobNotFound)?;
                return Err(e.into());
            }

            bytes_synced += file.size;
            files_synced = index as i64 + 1;

            if last_progress_write.elapsed() >= Duration::from_secs(10) {
                self.sync_store
                    .update_progress(sync_id, bytes_synced, files_synced)
                    .await
                    .map_err(|_| TorreClouError::JobNotFound)?;
                last_progress_write = Instant::now();
            }
        }

        self.sync_store
            .update_progress(sync_id, bytes_synced, files_synced)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?;

        // Step 5: all-files success -> COMPLETED, then wait, then delete locally.
        self.sync_store.transition(sync_id, SyncStatus::Completed, TransitionSource::Worker, None).await?;

        tokio::time::sleep(Duration::from_secs(30)).await;
        if let Err(e) = tokio::fs::remove_dir_all(&sync.local_file_path).await {
            tracing::warn!(sync_id, error = %e, path = %sync.local_file_path, "local directory cleanup failed");
        }

        Ok(())
    }

    async fn upload_one_file(
        &self,
        job_id: JobId,
        sync_id: SyncId,
        target: &S3Target,
        key: &str,
        file: &LocalFile,
    ) -> Result<(), TorreClouError> {
        if object_exists(&target.client, &target.bucket, key).await? {
            return Ok(());
        }

        let existing = self
            .transfer_progress
            .load(job_id, Some(sync_id), &file.relative_path)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?;

        let (upload_id, mut start_part) = match existing {
            Some(row) => (row.provider_upload_id.clone(), row.next_part_number()),
            None => {
                let upload_id = initiate_multipart(&target.client, &target.bucket, key).await?;
                let parts = total_parts(file.size, self.part_size);
                self.transfer_progress
                    .start(job_id, Some(sync_id), &file.relative_path, key, &upload_id, self.part_size, parts, file.size)
                    .await
                    .map_err(|_| TorreClouError::JobNotFound)?;
                (upload_id, 1)
            }
        };

        let parts = total_parts(file.size, self.part_size);
        while start_part <= parts {
            let offset = (start_part as i64 - 1) * self.part_size;
            let part_bytes = std::cmp::min(self.part_size, file.size - offset);

            let part =
                upload_part_from_file(&target.client, &target.bucket, key, &upload_id, start_part, &file.absolute_path, self.part_size)
                    .await?;
            self.transfer_progress
                .append_part(job_id, Some(sync_id), &file.relative_path, part, part_bytes)
                .await
                .map_err(|_| TorreClouError::JobNotFound)?;
            start_part += 1;
        }

        let all_etags = self
            .transfer_progress
            .load(job_id, Some(sync_id), &file.relative_path)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?
            .map(|p| p.part_etags)
            .unwrap_or_default();

        complete_multipart(&target.client, &target.bucket, key, &upload_id, &all_etags).await?;
        self.transfer_progress
            .complete_and_remove(job_id, Some(sync_id), &file.relative_path)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_runnable_statuses_are_excluded() {
        assert!(!matches!(SyncStatus::Syncing, SyncStatus::Pending | SyncStatus::SyncRetry));
        assert!(matches!(SyncStatus::SyncRetry, SyncStatus::Pending | SyncStatus::SyncRetry));
    }
}
