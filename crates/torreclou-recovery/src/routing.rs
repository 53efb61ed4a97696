//! Per-provider queue routing (§4.10 "A per-provider strategy maps a
//! monitored status to the correct queue").

use torreclou_core::job::JobStatus;
use torreclou_core::provider::ProviderType;
use torreclou_core::sync::SyncStatus;

/// Which background-task queue a recovered Job re-dispatches into.
/// Download statuses go to the torrent queue; pending/active/retrying
/// upload statuses go to the profile's provider queue.
pub fn job_queue(status: JobStatus, provider: ProviderType) -> &'static str {
    match status {
        JobStatus::Queued | JobStatus::Downloading | JobStatus::TorrentDownloadRetry => "torrents",
        _ => provider.queue_name(),
    }
}

/// Syncs always re-dispatch into the sync queue regardless of status.
pub fn sync_queue(_status: SyncStatus) -> &'static str {
    "sync"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_statuses_route_to_torrents() {
        assert_eq!(job_queue(JobStatus::Downloading, ProviderType::S3), "torrents");
        assert_eq!(job_queue(JobStatus::TorrentDownloadRetry, ProviderType::GoogleDrive), "torrents");
    }

    #[test]
    fn upload_statuses_route_to_provider_queue() {
        assert_eq!(job_queue(JobStatus::UploadRetry, ProviderType::GoogleDrive), "googledrive");
        assert_eq!(job_queue(JobStatus::Uploading, ProviderType::S3), "s3");
        assert_eq!(job_queue(JobStatus::PendingUpload, ProviderType::S3), "s3");
    }
}
