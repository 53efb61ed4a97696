//! Google Drive Upload Stage (§4.8), the full resumable-upload algorithm.
//! Structured the same way as `torreclou_download::DownloadStage`: one
//! `execute` entry point driving the numbered steps, generic over
//! `UploadTransport` so the folder/part bookkeeping is unit-testable
//! against a fake transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use torreclou_core::error::TorreClouError;
use torreclou_core::job::{Job, JobStatus, TransitionSource};
use torreclou_lease::{drive_lock_key, LeaseManager};
use torreclou_s3transport::total_parts;
use torreclou_store::jobs::JobStore;
use torreclou_store::transfer_progress::TransferProgressStore;

use crate::progress_cache::{DriveProgress, ProgressCache};
use crate::transport::{RemoteLocation, UploadTransport};

/// Engine-local artifact filter shared with the download/sync stages
/// (§6 "Filesystem layout"): never uploaded.
fn is_engine_local_artifact(file_name: &str) -> bool {
    file_name.ends_with(".fresume") || file_name.ends_with(".dht") || file_name == "dht_nodes.cache" || file_name == "fastresume"
}

#[derive(Debug, thiserror::Error)]
pub enum DriveStageError {
    #[error("lease not acquired, another worker holds it")]
    LeaseNotAcquired,
    #[error("transport error: {0}")]
    Transport(#[from] TorreClouError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct DriveStage<T: UploadTransport> {
    transport: Arc<T>,
    job_store: JobStore,
    transfer_progress: TransferProgressStore,
    progress_cache: ProgressCache,
    lease_manager: LeaseManager,
    part_size: i64,
}

impl<T: UploadTransport> DriveStage<T> {
    pub fn new(
        transport: Arc<T>,
        job_store: JobStore,
        transfer_progress: TransferProgressStore,
        progress_cache: ProgressCache,
        lease_manager: LeaseManager,
        part_size: i64,
    ) -> Self {
        Self { transport, job_store, transfer_progress, progress_cache, lease_manager, part_size }
    }

    /// Runs §4.8 steps 1-8 for one Drive job. `job.status` is `PENDING_UPLOAD`,
    /// `UPLOAD_RETRY`, or `UPLOADING` (recovery resume).
    pub async fn execute(&self, job: &Job) -> Result<(), DriveStageError> {
        // Step 1: acquire the provider lease; a miss is not a failure.
        let lease_ttl = Duration::from_secs(2 * 3600);
        let lease = match self.lease_manager.acquire(&drive_lock_key(job.id), lease_ttl).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::info!(job_id = job.id, "drive lease held by another worker, skipping");
                return Ok(());
            }
            Err(e) => return Err(TorreClouError::S3Error(e.to_string()).into()),
        };

        // Step 2: transition to UPLOADING if not already there.
        if job.status != JobStatus::Uploading {
            self.job_store
                .transition(job.id, JobStatus::Uploading, TransitionSource::Worker, None, None)
                .await?;
        }
        self.job_store.set_heartbeat(job.id).await.map_err(|_| TorreClouError::JobNotFound)?;

        // Step 3: validate.
        let download_path = job.download_path.clone().ok_or(TorreClouError::FileNotFound)?;
        if !Path::new(&download_path).exists() {
            return Err(TorreClouError::FileNotFound.into());
        }

        // Step 5: enumerate files, excluding engine-local artifacts.
        let files = enumerate_files(&download_path).await?;

        // Step 6 (folder hierarchy): resume the progress cache, or create
        // the root folder named `Torrent_<jobId>_<yyyyMMdd_HHmmss>`.
        let mut progress = self.progress_cache.load(job.id).await?;
        if progress.root_folder_id.is_none() {
            let root_name = format!("Torrent_{}_{}", job.id, Utc::now().format("%Y%m%d_%H%M%S"));
            let root_id = self.transport.find_or_create_folder(&root_name, None).await?;
            progress.root_folder_id = Some(root_id);
            self.progress_cache.save(job.id, &progress).await?;
        }
        let root_folder_id = progress.root_folder_id.clone().unwrap_or_default();

        let mut total_uploaded_bytes: i64 = 0;
        for file in &files {
            if progress.completed_files.contains_key(&file.relative_path) {
                continue;
            }

            let folder_id = self.resolve_parent_folder(job.id, &root_folder_id, &file.relative_path, &mut progress).await?;
            let file_name = Path::new(&file.relative_path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.relative_path.clone());
            let location = RemoteLocation { folder_id, file_name };

            // Step 6a: pre-existing remote object of the same name.
            if let Some(remote_id) = self.transport.find_existing(&location).await? {
                progress.completed_files.insert(file.relative_path.clone(), remote_id);
                self.progress_cache.save(job.id, &progress).await?;
                continue;
            }

            self.upload_one_file(job.id, &location, file, &mut progress).await?;
            total_uploaded_bytes += file.size;
        }

        // Step 7: Drive path — transition to COMPLETED, release lease.
        self.job_store
            .transition(
                job.id,
                JobStatus::Completed,
                TransitionSource::Worker,
                None,
                Some(serde_json::json!({ "bytesUploaded": total_uploaded_bytes })),
            )
            .await?;

        self.progress_cache.clear(job.id).await?;
        self.lease_manager.release(&lease).await.map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        tracing::info!(job_id = job.id, total_uploaded_bytes, "drive upload completed");
        Ok(())
    }

    /// Classifies a failed attempt into `UPLOAD_RETRY` (attempts remain) or
    /// the Drive-specific terminal `GOOGLE_DRIVE_FAILED` (exhausted),
    /// called by the worker-level task wrapper that knows the task's
    /// attempt count against its configured maximum.
    pub async fn classify_failure(&self, job_id: i64, reason: &str, retries_remain: bool) -> Result<(), DriveStageError> {
        let status = if retries_remain { JobStatus::UploadRetry } else { JobStatus::GoogleDriveFailed };
        self.job_store
            .transition(job_id, status, TransitionSource::Worker, Some(reason.to_string()), None)
            .await?;
        Ok(())
    }

    /// Resolves the Drive folder id a file's parent directory should upload
    /// into, building the `relativeDir → folderId` map parents-first
    /// (§4.8 "Folder hierarchy (Drive)") and persisting each new entry to
    /// the progress cache as it is created. A file directly under the
    /// download root resolves to `root_folder_id`; any lookup that can't be
    /// resolved falls back to the root.
    async fn resolve_parent_folder(
        &self,
        job_id: i64,
        root_folder_id: &str,
        relative_path: &str,
        progress: &mut DriveProgress,
    ) -> Result<String, DriveStageError> {
        let dir = match relative_path.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => return Ok(root_folder_id.to_string()),
        };

        if let Some(id) = progress.folder_ids.get(dir) {
            return Ok(id.clone());
        }

        let mut parent_id = root_folder_id.to_string();
        let mut built = String::new();
        for segment in dir.split('/') {
            built = if built.is_empty() { segment.to_string() } else { format!("{built}/{segment}") };
            if let Some(id) = progress.folder_ids.get(&built) {
                parent_id = id.clone();
                continue;
            }

            let folder_id = self.transport.find_or_create_folder(segment, Some(&parent_id)).await?;
            progress.folder_ids.insert(built.clone(), folder_id.clone());
            self.progress_cache.save(job_id, progress).await?;
            parent_id = folder_id;
        }

        Ok(parent_id)
    }

    async fn upload_one_file(
        &self,
        job_id: i64,
        location: &RemoteLocation,
        file: &LocalFile,
        progress: &mut DriveProgress,
    ) -> Result<(), DriveStageError> {
        let existing = self.transfer_progress.load(job_id, None, &file.relative_path).await.map_err(|_| TorreClouError::JobNotFound)?;

        let (provider_upload_id, mut start_part) = match existing {
            Some(row) => (row.provider_upload_id.clone(), row.next_part_number()),
            None => {
                let upload_id = self.transport.initiate(location, file.size).await?;
                let parts = total_parts(file.size, self.part_size);
                self.transfer_progress
                    .start(job_id, None, &file.relative_path, &location.file_name, &upload_id, self.part_size, parts, file.size)
                    .await
                    .map_err(|_| TorreClouError::JobNotFound)?;
                (upload_id, 1)
            }
        };

        let parts = total_parts(file.size, self.part_size);
        while start_part <= parts {
            let offset = (start_part as i64 - 1) * self.part_size;
            let chunk = read_chunk(&file.absolute_path, offset, self.part_size).await?;

            let part = self
                .transport
                .upload_part(&provider_upload_id, start_part, file.size, self.part_size, chunk.clone())
                .await;

            let part = match part {
                Ok(part) => part,
                Err(e) => {
                    // §4.8 step 6 "On failure mid-file: leave TransferProgress
                    // in place with status InProgress for future resume".
                    return Err(e.into());
                }
            };

            self.transfer_progress
                .append_part(job_id, None, &file.relative_path, part, chunk.len() as i64)
                .await
                .map_err(|_| TorreClouError::JobNotFound)?;

            start_part += 1;
        }

        self.transport.complete(&provider_upload_id, location).await?;
        self.transfer_progress
            .complete_and_remove(job_id, None, &file.relative_path)
            .await
            .map_err(|_| TorreClouError::JobNotFound)?;

        progress.completed_files.insert(file.relative_path.clone(), location.file_name.clone());
        self.progress_cache.save(job_id, progress).await?;
        Ok(())
    }
}

pub struct LocalFile {
    pub relative_path: String,
    pub absolute_path: String,
    pub size: i64,
}

async fn enumerate_files(root: &str) -> Result<Vec<LocalFile>, std::io::Error> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_string()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                stack.push(path.to_string_lossy().to_string());
                continue;
            }

            let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            if is_engine_local_artifact(&file_name) {
                continue;
            }

            let relative_path = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push(LocalFile { relative_path, absolute_path: path.to_string_lossy().to_string(), size: metadata.len() as i64 });
        }
    }

    Ok(out)
}

async fn read_chunk(path: &str, offset: i64, max_len: i64) -> Result<Vec<u8>, std::io::Error> {
    use tokio::io::{AsyncReadExt, AsyncSeekExt};
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset as u64)).await?;
    let mut buf = vec![0u8; max_len as usize];
    let mut total_read = 0usize;
    loop {
        let n = file.read(&mut buf[total_read..]).await?;
        if n == 0 {
            break;
        }
        total_read += n;
        if total_read == buf.len() {
            break;
        }
    }
    buf.truncate(total_read);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_local_artifacts_are_excluded_from_upload() {
        assert!(is_engine_local_artifact("piece.fresume"));
        assert!(is_engine_local_artifact("fastresume"));
        assert!(!is_engine_local_artifact("movie.mkv"));
    }
}
