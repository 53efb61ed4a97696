use torreclou_eventlog::{SyncStreamEntry, SYNC_STREAM, SYNC_WORKERS_GROUP};

use crate::handler::DispatchHandler;

/// Dispatches `sync:stream` into the `sync` queue (§4.4, §4.5).
pub struct SyncDispatchHandler;

impl DispatchHandler for SyncDispatchHandler {
    fn stream_name(&self) -> String {
        SYNC_STREAM.to_string()
    }

    fn group_name(&self) -> String {
        SYNC_WORKERS_GROUP.to_string()
    }

    fn queue_name(&self) -> &'static str {
        "sync"
    }

    fn job_id_of(&self, fields: &[(String, String)]) -> anyhow::Result<i64> {
        Ok(SyncStreamEntry::from_fields(fields)?.job_id)
    }

    fn build_task_args(&self, fields: &[(String, String)]) -> anyhow::Result<serde_json::Value> {
        let entry = SyncStreamEntry::from_fields(fields)?;
        Ok(serde_json::json!({ "jobId": entry.job_id, "syncId": entry.sync_id }))
    }
}
