//! Row -> domain-type mapping, kept in one place so every query site agrees
//! on column order and nullability handling.

use sqlx::postgres::PgRow;
use sqlx::Row;
use torreclou_core::job::{Job, JobStatus};
use torreclou_core::provider::{ProviderType, StorageProfile};
use torreclou_core::sync::{Sync, SyncStatus};
use torreclou_core::transfer_progress::{PartETag, TransferProgress, TransferProgressStatus};

pub fn job_from_row(row: &PgRow) -> anyhow::Result<Job> {
    let status_str: String = row.try_get("status")?;
    let selected_file_paths: serde_json::Value = row.try_get("selected_file_paths")?;

    Ok(Job {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        storage_profile_id: row.try_get("storage_profile_id")?,
        requested_file_id: row.try_get("requested_file_id")?,
        status: JobStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown job status {status_str:?} in database"))?,
        selected_file_paths: serde_json::from_value(selected_file_paths).unwrap_or_default(),
        download_path: row.try_get("download_path")?,
        bytes_downloaded: row.try_get("bytes_downloaded")?,
        total_bytes: row.try_get("total_bytes")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
        background_task_id: row.try_get("background_task_id")?,
        error_message: row.try_get("error_message")?,
        current_state_label: row.try_get("current_state_label")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn sync_from_row(row: &PgRow) -> anyhow::Result<Sync> {
    let status_str: String = row.try_get("status")?;

    Ok(Sync {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        status: SyncStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("unknown sync status {status_str:?} in database"))?,
        local_file_path: row.try_get("local_file_path")?,
        s3_key_prefix: row.try_get("s3_key_prefix")?,
        total_bytes: row.try_get("total_bytes")?,
        bytes_synced: row.try_get("bytes_synced")?,
        files_total: row.try_get("files_total")?,
        files_synced: row.try_get("files_synced")?,
        retry_count: row.try_get("retry_count")?,
        next_retry_at: row.try_get("next_retry_at")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
        background_task_id: row.try_get("background_task_id")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub fn profile_from_row(row: &PgRow) -> anyhow::Result<StorageProfile> {
    let provider_str: String = row.try_get("provider_type")?;

    Ok(StorageProfile {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        profile_name: row.try_get("profile_name")?,
        provider_type: ProviderType::from_str(&provider_str)
            .ok_or_else(|| anyhow::anyhow!("unknown provider type {provider_str:?} in database"))?,
        credentials_json: row.try_get("credentials_json")?,
        email: row.try_get("email")?,
        is_active: row.try_get("is_active")?,
        is_default: row.try_get("is_default")?,
    })
}

pub fn transfer_progress_from_row(row: &PgRow) -> anyhow::Result<TransferProgress> {
    let status_str: String = row.try_get("status")?;
    let part_etags: serde_json::Value = row.try_get("part_etags")?;
    let part_etags: Vec<PartETag> = serde_json::from_value(part_etags).unwrap_or_default();

    Ok(TransferProgress {
        job_id: row.try_get("job_id")?,
        sync_id: row.try_get("sync_id")?,
        local_file_path: row.try_get("local_file_path")?,
        remote_key: row.try_get("remote_key")?,
        provider_upload_id: row.try_get("provider_upload_id")?,
        part_size: row.try_get("part_size")?,
        total_parts: row.try_get("total_parts")?,
        parts_completed: row.try_get("parts_completed")?,
        bytes_uploaded: row.try_get("bytes_uploaded")?,
        total_bytes: row.try_get("total_bytes")?,
        part_etags,
        last_part_number: row.try_get("last_part_number")?,
        status: match status_str.as_str() {
            "InProgress" => TransferProgressStatus::InProgress,
            "Completed" => TransferProgressStatus::Completed,
            "Failed" => TransferProgressStatus::Failed,
            other => anyhow::bail!("unknown transfer progress status {other:?}"),
        },
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}
