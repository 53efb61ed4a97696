//! Download Stage (§4.7): preconditions, the eight-step algorithm, the
//! monitoring loop, and failure semantics. Generic over `TorrentEngine` so
//! the algorithm is unit-testable against a fake engine.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use torreclou_core::job::{Job, JobStatus, TransitionSource};
use torreclou_eventlog::{EventLog, UploadsStreamEntry};
use torreclou_store::jobs::JobStore;

use crate::engine::{EngineState, TorrentEngine};
use crate::selection::assign_priorities;

/// Engine-local artifact names never uploaded downstream (§6 "Filesystem
/// layout"). Same exclusion filter the Upload/Sync stages apply.
pub const ENGINE_LOCAL_SUFFIXES: &[&str] = &[".fresume", ".dht"];
pub const ENGINE_LOCAL_NAMES: &[&str] = &["dht_nodes.cache", "fastresume"];

pub fn is_engine_local_artifact(file_name: &str) -> bool {
    ENGINE_LOCAL_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix))
        || ENGINE_LOCAL_NAMES.contains(&file_name)
}

pub struct DownloadStage<E: TorrentEngine> {
    engine: Arc<E>,
    job_store: JobStore,
    event_log: EventLog,
    torrent_root: String,
    poll_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadStageError {
    /// Terminal: the job has already been transitioned to `TORRENT_FAILED`
    /// by this call, no retry is meaningful.
    #[error("V2OnlyNotSupported")]
    V2OnlyNotSupported,
    /// The engine reported an unrecoverable error mid-download. Fast-resume
    /// state has already been saved; the caller (§4.7 "Failure semantics",
    /// implemented one layer up where the task's attempt count is known)
    /// decides `TORRENT_DOWNLOAD_RETRY` vs `TORRENT_FAILED` and re-raises to
    /// the task runtime for its own bookkeeping.
    #[error("engine reported failure: {0}")]
    EngineFailure(String),
    #[error("engine error: {0}")]
    Engine(#[from] anyhow::Error),
    #[error("store error: {0}")]
    Store(#[from] torreclou_core::error::TorreClouError),
}

impl<E: TorrentEngine> DownloadStage<E> {
    pub fn new(engine: Arc<E>, job_store: JobStore, event_log: EventLog, torrent_root: String, poll_interval: Duration) -> Self {
        Self { engine, job_store, event_log, torrent_root, poll_interval }
    }

    /// Runs the full algorithm (§4.7 steps 1-8) for one job. Preconditions
    /// (status QUEUED or TORRENT_DOWNLOAD_RETRY, a loadable request file)
    /// are the caller's responsibility to have checked before dispatch; this
    /// assumes `job` was just loaded in one of those statuses and
    /// `torrent_source` (a local path or HTTPS URL) is already resolved.
    pub async fn execute(
        &self,
        job: &Job,
        torrent_source: &str,
        provider_queue: &'static str,
        cancellation: CancellationToken,
    ) -> Result<(), DownloadStageError> {
        // Step 1: resume in place if downloadPath already exists, else create it.
        let download_path = match &job.download_path {
            Some(p) if Path::new(p).exists() => p.clone(),
            _ => {
                let p = format!("{}/{}", self.torrent_root, job.id);
                tokio::fs::create_dir_all(&p).await.map_err(|e| anyhow::anyhow!(e))?;
                p
            }
        };

        // Step 2: load + parse the torrent; reject v2-only (§4.7 step 2).
        let info = self.engine.load(torrent_source).await?;
        if info.is_v2_only {
            self.fail_terminal(job.id, JobStatus::TorrentFailed, "V2OnlyNotSupported").await?;
            return Err(DownloadStageError::V2OnlyNotSupported);
        }

        self.job_store
            .set_download_metadata(job.id, &download_path, info.total_bytes as i64)
            .await
            .map_err(anyhow::Error::from)?;

        // Step 3: transition to DOWNLOADING.
        let from_retry = job.status == JobStatus::TorrentDownloadRetry;
        self.job_store
            .transition(
                job.id,
                JobStatus::Downloading,
                TransitionSource::Worker,
                None,
                Some(serde_json::json!({
                    "downloadPath": download_path,
                    "totalBytes": info.total_bytes,
                    "torrentName": info.name,
                    "resumedFromRetry": from_retry,
                })),
            )
            .await?;

        // Step 4 + 5: start the engine, then set per-file priority.
        let handle = self.engine.start(torrent_source, &download_path).await?;
        let file_names: Vec<String> = info.files.iter().map(|f| f.relative_path.clone()).collect();
        let priorities = assign_priorities(&file_names, &job.selected_file_paths);
        handle.set_file_priorities(&priorities).await?;

        // Step 6/7: if already seeding at 100%, skip the monitoring loop.
        let mut last_heartbeat = Instant::now() - Duration::from_secs(60);
        let mut last_fastresume = Instant::now();
        let mut bytes_at_last_sample: i64 = 0;

        loop {
            let progress = handle.progress().await?;

            if progress.state == EngineState::Seeding || progress.percent >= 100.0 {
                break;
            }

            if progress.state == EngineState::Error {
                handle.save_fastresume().await.ok();
                let reason = progress.error_message.unwrap_or_else(|| "unknown engine error".to_string());
                return Err(DownloadStageError::EngineFailure(reason));
            }

            if cancellation.is_cancelled() {
                handle.save_fastresume().await.ok();
                return Ok(());
            }

            if last_heartbeat.elapsed() >= Duration::from_secs(5) {
                let bytes_downloaded = ((info.total_bytes as f64) * (progress.percent / 100.0)) as i64;
                let label = format!("downloading {:.1}%", progress.percent);
                self.job_store
                    .update_download_progress(job.id, bytes_downloaded, &label)
                    .await
                    .map_err(anyhow::Error::from)?;

                if bytes_downloaded - bytes_at_last_sample >= 100 * 1024 * 1024 {
                    tracing::info!(job_id = job.id, bytes_downloaded, "download speed sample");
                    bytes_at_last_sample = bytes_downloaded;
                }
                last_heartbeat = Instant::now();
            }

            if last_fastresume.elapsed() >= Duration::from_secs(30) {
                handle.save_fastresume().await.ok();
                last_fastresume = Instant::now();
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        // Step 8: final fast-resume save, transition, hand off to upload.
        handle.save_fastresume().await.ok();
        self.job_store
            .transition(job.id, JobStatus::PendingUpload, TransitionSource::Worker, None, None)
            .await?;

        self.event_log
            .append_upload(
                provider_queue,
                &UploadsStreamEntry::new(job.id, download_path, job.storage_profile_id, job.user_id),
            )
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(())
    }

    /// Classifies an engine failure into `TORRENT_DOWNLOAD_RETRY` (attempts
    /// remain) or `TORRENT_FAILED` (exhausted), per §4.7 "Failure
    /// semantics". Called by the worker-level task wrapper, which is the
    /// layer that knows the task's attempt count against its configured
    /// maximum.
    pub async fn classify_failure(&self, job_id: i64, reason: &str, retries_remain: bool) -> Result<(), DownloadStageError> {
        let status = if retries_remain { JobStatus::TorrentDownloadRetry } else { JobStatus::TorrentFailed };
        self.fail_terminal(job_id, status, reason).await
    }

    async fn fail_terminal(&self, job_id: i64, status: JobStatus, reason: &str) -> Result<(), DownloadStageError> {
        self.job_store
            .transition(job_id, status, TransitionSource::Worker, Some(reason.to_string()), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_local_artifacts_are_excluded() {
        assert!(is_engine_local_artifact("piece.fresume"));
        assert!(is_engine_local_artifact("dht_nodes.cache"));
        assert!(is_engine_local_artifact("fastresume"));
        assert!(!is_engine_local_artifact("movie.mkv"));
    }
}
