use std::time::Duration;

use async_trait::async_trait;
use torreclou_eventlog::EventLog;
use torreclou_store::jobs::JobStore;
use torreclou_taskrt::{TaskDescriptor, TaskRuntime};

/// What differs between the `jobs:stream`, `uploads:<provider>:stream`, and
/// `sync:stream` dispatchers (§4.5). Everything else — the read/gate/enqueue/
/// ack loop — lives once in `StreamDispatcher::run`.
#[async_trait]
pub trait DispatchHandler: Send + Sync {
    fn stream_name(&self) -> String;
    fn group_name(&self) -> String;
    /// Background-task queue a message on this stream dispatches into.
    fn queue_name(&self) -> &'static str;
    /// Parses the job id out of one stream entry's fields.
    fn job_id_of(&self, fields: &[(String, String)]) -> anyhow::Result<i64>;
    /// Builds the JSON args the enqueued task will carry (§4.6 "arbitrary
    /// arguments"); typically just the parsed fields re-encoded.
    fn build_task_args(&self, fields: &[(String, String)]) -> anyhow::Result<serde_json::Value>;
}

pub struct StreamDispatcher<H: DispatchHandler> {
    event_log: EventLog,
    job_store: JobStore,
    task_runtime: TaskRuntime,
    consumer_name: String,
    task_max_attempts: i32,
    handler: H,
}

impl<H: DispatchHandler> StreamDispatcher<H> {
    pub fn new(
        event_log: EventLog,
        job_store: JobStore,
        task_runtime: TaskRuntime,
        consumer_name: impl Into<String>,
        task_max_attempts: i32,
        handler: H,
    ) -> Self {
        Self {
            event_log,
            job_store,
            task_runtime,
            consumer_name: consumer_name.into(),
            task_max_attempts,
            handler,
        }
    }

    /// Runs the consume loop until `shutdown` is observed. Each batch
    /// message goes through steps (a)-(g) of §4.5:
    /// (a) blocking-read, (b) scoped unit of work (one message at a time —
    /// the Job Store's own transactions give us that), (c) parse + load,
    /// (d) idempotency gate, (e) enqueue, (f) persist `backgroundTaskId`,
    /// (g) commit + ack.
    pub async fn run(&self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let stream = self.handler.stream_name();
        let group = self.handler.group_name();
        self.event_log.ensure_group(&stream, &group).await?;

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let batch = self
                .event_log
                .read_group(&stream, &group, &self.consumer_name, 16, Duration::from_secs(2))
                .await?;

            for (entry_id, fields) in batch {
                if let Err(e) = self.handle_one(&stream, &group, &entry_id, &fields).await {
                    // Not acked: §4.5 "On any error between (d) and (g), the
                    // message is not acknowledged; the stream will
                    // redeliver."
                    tracing::warn!(error = %e, %entry_id, stream, "dispatch failed, leaving unacked for redelivery");
                }
            }
        }
    }

    async fn handle_one(
        &self,
        stream: &str,
        group: &str,
        entry_id: &str,
        fields: &[(String, String)],
    ) -> anyhow::Result<()> {
        let job_id = self.handler.job_id_of(fields)?;

        let job = self
            .job_store
            .load(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("job {job_id} not found"))?;

        // (d) idempotency gate: already dispatched or already terminal.
        if job.background_task_id.is_some() || job.status.is_terminal() {
            self.event_log.ack(stream, group, entry_id).await?;
            return Ok(());
        }

        let args = self.handler.build_task_args(fields)?;
        let task_id = self
            .task_runtime
            .enqueue(TaskDescriptor {
                queue: self.handler.queue_name().to_string(),
                job_id,
                args,
                max_attempts: self.task_max_attempts,
            })
            .await?;

        self.job_store.set_background_task_id(job_id, task_id).await?;

        // Ack only after the task id is durably persisted (§4.4
        // "Acknowledgement rule").
        self.event_log.ack(stream, group, entry_id).await?;
        Ok(())
    }
}
