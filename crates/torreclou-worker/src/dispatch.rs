//! Spawns the three dispatcher kinds named in the event log's streams:
//! `jobs:stream`, one `uploads:<provider>:stream` per supported provider,
//! and `sync:stream`. Each runs its own consume loop until `shutdown` fires.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use torreclou_dispatcher::{JobsDispatchHandler, StreamDispatcher, SyncDispatchHandler, UploadsDispatchHandler};
use torreclou_eventlog::EventLog;
use torreclou_store::JobStore;
use torreclou_taskrt::TaskRuntime;

/// Providers with a concrete Upload Stage in this workspace; routing a
/// profile on an unsupported provider is rejected earlier, at job
/// creation, so no dispatcher is ever needed for them.
const UPLOAD_PROVIDER_QUEUES: &[&str] = &["googledrive", "s3"];

pub fn spawn_all(
    event_log: EventLog,
    job_store: JobStore,
    task_runtime: TaskRuntime,
    consumer_name: String,
    task_max_attempts: i32,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    {
        let dispatcher = StreamDispatcher::new(
            event_log.clone(),
            job_store.clone(),
            task_runtime.clone(),
            consumer_name.clone(),
            task_max_attempts,
            JobsDispatchHandler,
        );
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = dispatcher.run(shutdown).await {
                tracing::error!(error = %e, "jobs dispatcher exited");
            }
        }));
    }

    {
        let dispatcher = StreamDispatcher::new(
            event_log.clone(),
            job_store.clone(),
            task_runtime.clone(),
            consumer_name.clone(),
            task_max_attempts,
            SyncDispatchHandler,
        );
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = dispatcher.run(shutdown).await {
                tracing::error!(error = %e, "sync dispatcher exited");
            }
        }));
    }

    for provider_queue in UPLOAD_PROVIDER_QUEUES {
        let dispatcher = StreamDispatcher::new(
            event_log.clone(),
            job_store.clone(),
            task_runtime.clone(),
            consumer_name.clone(),
            task_max_attempts,
            UploadsDispatchHandler { provider_queue },
        );
        let shutdown = shutdown.clone();
        let provider_queue = *provider_queue;
        handles.push(tokio::spawn(async move {
            if let Err(e) = dispatcher.run(shutdown).await {
                tracing::error!(error = %e, provider_queue, "uploads dispatcher exited");
            }
        }));
    }

    handles
}
