//! Process-external progress cache (§4.8 "Progress cache"): keyed by jobId,
//! holds the root folder id, the relativePath→remoteId map, and in-progress
//! resumable session ids, so a restarted upload finds prior work in O(1)
//! instead of re-walking the remote folder tree.

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use torreclou_core::error::TorreClouError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveProgress {
    pub root_folder_id: Option<String>,
    /// `relativeDir → folderId`, parents-first.
    pub folder_ids: HashMap<String, String>,
    /// `relativePath → remoteFileId` for files already confirmed complete.
    pub completed_files: HashMap<String, String>,
    /// `relativePath → providerUploadId` for sessions in flight.
    pub in_progress_sessions: HashMap<String, String>,
}

#[derive(Clone)]
pub struct ProgressCache {
    conn: ConnectionManager,
}

fn cache_key(job_id: i64) -> String {
    format!("gdrive:progress:{job_id}")
}

impl ProgressCache {
    pub async fn connect(redis_url: &str) -> Result<Self, TorreClouError> {
        let client = redis::Client::open(redis_url).map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn load(&self, job_id: i64) -> Result<DriveProgress, TorreClouError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> =
            conn.get(cache_key(job_id)).await.map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json).map_err(|e| TorreClouError::S3Error(e.to_string())),
            None => Ok(DriveProgress::default()),
        }
    }

    pub async fn save(&self, job_id: i64, progress: &DriveProgress) -> Result<(), TorreClouError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(progress).map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        let _: () = conn.set(cache_key(job_id), json).await.map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        Ok(())
    }

    pub async fn clear(&self, job_id: i64) -> Result<(), TorreClouError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(cache_key(job_id)).await.map_err(|e| TorreClouError::S3Error(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_namespaced_by_job() {
        assert_eq!(cache_key(42), "gdrive:progress:42");
    }

    #[test]
    fn default_progress_is_empty() {
        let progress = DriveProgress::default();
        assert!(progress.root_folder_id.is_none());
        assert!(progress.folder_ids.is_empty());
    }
}
