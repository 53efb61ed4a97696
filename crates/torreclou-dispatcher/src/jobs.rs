use torreclou_eventlog::{JobsStreamEntry, JOBS_STREAM, TORRENT_WORKERS_GROUP};

use crate::handler::DispatchHandler;

/// Dispatches `jobs:stream` into the `torrents` queue (§4.4, §4.5).
pub struct JobsDispatchHandler;

impl DispatchHandler for JobsDispatchHandler {
    fn stream_name(&self) -> String {
        JOBS_STREAM.to_string()
    }

    fn group_name(&self) -> String {
        TORRENT_WORKERS_GROUP.to_string()
    }

    fn queue_name(&self) -> &'static str {
        "torrents"
    }

    fn job_id_of(&self, fields: &[(String, String)]) -> anyhow::Result<i64> {
        Ok(JobsStreamEntry::from_fields(fields)?.job_id)
    }

    fn build_task_args(&self, fields: &[(String, String)]) -> anyhow::Result<serde_json::Value> {
        let entry = JobsStreamEntry::from_fields(fields)?;
        Ok(serde_json::json!({ "jobId": entry.job_id }))
    }
}
