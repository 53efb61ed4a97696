use torreclou_eventlog::{provider_workers_group, uploads_stream, UploadsStreamEntry};

use crate::handler::DispatchHandler;

/// Dispatches `uploads:<provider>:stream` into the provider's upload queue
/// (§4.4, §4.5). One instance per provider (`googledrive`, `s3`).
pub struct UploadsDispatchHandler {
    pub provider_queue: &'static str,
}

impl DispatchHandler for UploadsDispatchHandler {
    fn stream_name(&self) -> String {
        uploads_stream(self.provider_queue)
    }

    fn group_name(&self) -> String {
        provider_workers_group(self.provider_queue)
    }

    fn queue_name(&self) -> &'static str {
        self.provider_queue
    }

    fn job_id_of(&self, fields: &[(String, String)]) -> anyhow::Result<i64> {
        Ok(UploadsStreamEntry::from_fields(fields)?.job_id)
    }

    fn build_task_args(&self, fields: &[(String, String)]) -> anyhow::Result<serde_json::Value> {
        let entry = UploadsStreamEntry::from_fields(fields)?;
        Ok(serde_json::json!({
            "jobId": entry.job_id,
            "downloadPath": entry.download_path,
            "storageProfileId": entry.storage_profile_id,
            "userId": entry.user_id,
            "createdAt": entry.created_at,
        }))
    }
}
