//! Composition root: builds every store/stage/dispatcher from one config and
//! pool, then runs them all until shutdown. Mirrors the teacher's `App`
//! struct (one place that owns every long-lived handle and hands out clones
//! of the cheap ones), generalized from one resumable-download loop to this
//! process's four queues plus the recovery scan.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use torreclou_core::config::TorreClouConfig;
use torreclou_download::{DownloadStage, LibrqbitEngine};
use torreclou_eventlog::EventLog;
use torreclou_lease::LeaseManager;
use torreclou_recovery::RecoverySupervisor;
use torreclou_store::{connect_and_migrate, JobStore, ProfileStore, RequestedFileStore, SyncStore, TransferProgressStore};
use torreclou_sync::SyncStage;
use torreclou_taskrt::TaskRuntime;
use torreclou_upload::{ProgressCache, S3UploadStage};

use crate::api::Api;
use crate::dispatch;
use crate::failure_hook::JobFailureHook;
use crate::handlers::Handlers;
use crate::profile_lookup::StoreProfileLookup;

/// One queue's worker-pool concurrency, task handler, and display name,
/// bundled so `run` can loop over them uniformly instead of repeating the
/// `run_worker_pool` call four times with slightly different closures.
pub struct App {
    config: TorreClouConfig,
    job_store: JobStore,
    sync_store: SyncStore,
    profiles: ProfileStore,
    event_log: EventLog,
    task_runtime: TaskRuntime,
    lease_manager: LeaseManager,
    handlers: Arc<Handlers>,
    api: Arc<Api>,
}

impl App {
    /// Connects to Postgres and Redis, runs pending migrations, and wires
    /// every store/stage into one `Handlers` instance. No background loop is
    /// started here; call `run` for that.
    pub async fn build(config: TorreClouConfig) -> anyhow::Result<Self> {
        let pool = connect_and_migrate(&config.database_url).await?;

        let job_store = JobStore::new(pool.clone());
        let sync_store = SyncStore::new(pool.clone());
        let profiles = ProfileStore::new(pool.clone());
        let requested_files = RequestedFileStore::new(pool.clone());
        let transfer_progress = TransferProgressStore::new(pool.clone());

        let event_log = EventLog::connect(&config.redis_url).await?;
        let lease_manager = LeaseManager::connect(&config.redis_url).await?;
        let progress_cache = ProgressCache::connect(&config.redis_url).await?;

        let failure_hook = Arc::new(JobFailureHook::new(job_store.clone()));
        let task_runtime = TaskRuntime::new(pool.clone(), config.task_retry_delays.clone(), failure_hook);

        let download_stage = DownloadStage::new(
            Arc::new(LibrqbitEngine),
            job_store.clone(),
            event_log.clone(),
            config.torrent_root.clone(),
            config.download_poll_interval,
        );
        let s3_stage = S3UploadStage::new(job_store.clone(), sync_store.clone(), event_log.clone(), lease_manager.clone());
        let sync_stage = SyncStage::new(sync_store.clone(), transfer_progress.clone(), config.upload_part_size as i64);

        let handlers = Arc::new(Handlers {
            job_store: job_store.clone(),
            sync_store: sync_store.clone(),
            profiles: profiles.clone(),
            requested_files,
            transfer_progress,
            progress_cache,
            lease_manager: lease_manager.clone(),
            download_stage,
            s3_stage,
            sync_stage,
            http: reqwest::Client::new(),
            upload_part_size: config.upload_part_size as i64,
        });

        let api = Arc::new(Api::new(job_store.clone(), profiles.clone(), event_log.clone()));

        Ok(Self { config, job_store, sync_store, profiles, event_log, task_runtime, lease_manager, handlers, api })
    }

    /// External-interface handle (create/cancel/retry), for anything that
    /// embeds this process rather than driving it purely off the queues.
    pub fn api(&self) -> Arc<Api> {
        Arc::clone(&self.api)
    }

    /// Runs dispatchers, worker pools, and the recovery scan until
    /// `shutdown` fires, then waits for every spawned task to wind down.
    pub async fn run(&self, concurrency: usize, shutdown: CancellationToken) -> anyhow::Result<()> {
        let consumer_name = format!("worker-{}", std::process::id());

        self.event_log.ensure_group(torreclou_eventlog::JOBS_STREAM, torreclou_eventlog::TORRENT_WORKERS_GROUP).await?;
        self.event_log.ensure_group(torreclou_eventlog::SYNC_STREAM, torreclou_eventlog::SYNC_WORKERS_GROUP).await?;
        for provider_queue in ["googledrive", "s3"] {
            self.event_log
                .ensure_group(&torreclou_eventlog::uploads_stream(provider_queue), &torreclou_eventlog::provider_workers_group(provider_queue))
                .await?;
        }

        let mut handles = dispatch::spawn_all(
            self.event_log.clone(),
            self.job_store.clone(),
            self.task_runtime.clone(),
            consumer_name,
            self.config.task_max_attempts as i32,
            shutdown.clone(),
        );

        for queue in &self.config.queues {
            let Some(handle) = self.spawn_worker_pool(queue, concurrency, shutdown.clone()) else {
                continue;
            };
            handles.push(handle);
        }

        let supervisor = RecoverySupervisor::new(
            self.job_store.clone(),
            self.sync_store.clone(),
            self.task_runtime.clone(),
            Arc::new(StoreProfileLookup::new(self.profiles.clone())),
            self.config.heartbeat_staleness_threshold,
            self.config.recovery_scan_interval,
            self.config.task_max_attempts as i32,
        );
        let recovery_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            supervisor.run(recovery_shutdown).await;
        }));

        shutdown.cancelled().await;
        tracing::info!("shutdown signal received, waiting for queue workers to drain");
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Spawns one queue's worker pool, wrapping the matching `Handlers`
    /// method. Returns `None` for a name in `config.queues` this process has
    /// no handler for (the "default" placeholder some deployments keep in
    /// their queue list without ever routing a task to it).
    fn spawn_worker_pool(&self, queue: &str, concurrency: usize, shutdown: CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
        let task_runtime = self.task_runtime.clone();
        let handlers = Arc::clone(&self.handlers);
        let queue = queue.to_string();

        macro_rules! spawn_with {
            ($method:ident) => {{
                let queue_name = queue.clone();
                Some(tokio::spawn(async move {
                    task_runtime
                        .run_worker_pool(&queue_name, concurrency, shutdown, move |task, token| {
                            let handlers = Arc::clone(&handlers);
                            async move { handlers.$method(task, token).await }
                        })
                        .await;
                }))
            }};
        }

        match queue.as_str() {
            "torrents" => spawn_with!(handle_torrent),
            "googledrive" => spawn_with!(handle_drive),
            "s3" => spawn_with!(handle_s3),
            "sync" => spawn_with!(handle_sync),
            other => {
                tracing::warn!(queue = other, "no task handler registered for this queue, skipping");
                None
            }
        }
    }
}
