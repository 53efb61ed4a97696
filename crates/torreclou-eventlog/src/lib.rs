//! Event Log (§4.4): Redis Streams with consumer-group semantics, the
//! durable hand-off mechanism between stages. Three streams are named in the
//! spec — `jobs:stream`, `uploads:<provider>:stream`, `sync:stream` — each
//! with its own field set and consumer group. This crate owns the wire
//! encoding; `torreclou-dispatcher` owns the consume-gate-enqueue-ack loop
//! that reads from it.

pub mod messages;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

pub use messages::{JobsStreamEntry, SyncStreamEntry, UploadsStreamEntry};

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed stream entry: {0}")]
    Malformed(String),
}

/// Identifier of one delivered stream entry, opaque outside this crate
/// (Redis Streams IDs are `<ms>-<seq>` strings).
pub type EntryId = String;

#[derive(Clone)]
pub struct EventLog {
    conn: ConnectionManager,
}

/// Name of the stream new jobs are appended to (§4.4).
pub const JOBS_STREAM: &str = "jobs:stream";
/// Name of the stream upload-complete hand-offs are appended to (§4.4).
pub const SYNC_STREAM: &str = "sync:stream";

/// Name of the per-provider upload hand-off stream (§4.4
/// `uploads:<provider>:stream`).
pub fn uploads_stream(provider_queue: &str) -> String {
    format!("uploads:{provider_queue}:stream")
}

/// Consumer group name for a download dispatcher (§4.4).
pub const TORRENT_WORKERS_GROUP: &str = "torrent-workers";
/// Consumer group name for the sync dispatcher (§4.4).
pub const SYNC_WORKERS_GROUP: &str = "sync-workers";

/// Consumer group name for a provider's upload dispatcher (§4.4, e.g.
/// `googledrive-workers`).
pub fn provider_workers_group(provider_queue: &str) -> String {
    format!("{provider_queue}-workers")
}

impl EventLog {
    pub async fn connect(redis_url: &str) -> Result<Self, EventLogError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Idempotently creates the stream (via `XGROUP CREATE ... MKSTREAM`) and
    /// consumer group if they do not already exist.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), EventLogError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            // BUSYGROUP: the group already exists, which is the steady state
            // for every worker process after the first.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn append_job(&self, entry: &JobsStreamEntry) -> Result<EntryId, EventLogError> {
        self.xadd(JOBS_STREAM, &entry.to_fields()).await
    }

    pub async fn append_upload(
        &self,
        provider_queue: &str,
        entry: &UploadsStreamEntry,
    ) -> Result<EntryId, EventLogError> {
        self.xadd(&uploads_stream(provider_queue), &entry.to_fields()).await
    }

    pub async fn append_sync(&self, entry: &SyncStreamEntry) -> Result<EntryId, EventLogError> {
        self.xadd(SYNC_STREAM, &entry.to_fields()).await
    }

    async fn xadd(&self, stream: &str, fields: &[(&str, String)]) -> Result<EntryId, EventLogError> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", fields).await?;
        Ok(id)
    }

    /// Blocking-read a batch from `stream` under `group` as `consumer`
    /// (§4.5 step a). Never delivers an already-pending (unacked) entry to a
    /// *different* consumer within the block window; use `claim_stale` for
    /// that reclamation path.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: std::time::Duration,
    ) -> Result<Vec<(EntryId, Vec<(String, String)>)>, EventLogError> {
        let mut conn = self.conn.clone();
        let opts = redis::streams::StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block.as_millis() as usize);

        let reply: redis::streams::StreamReadReply =
            conn.xread_options(&[stream], &[">"], &opts).await?;

        let mut out = Vec::new();
        for stream_key in reply.keys {
            for id in stream_key.ids {
                let fields: Vec<(String, String)> = id
                    .map
                    .into_iter()
                    .filter_map(|(k, v)| redis::from_redis_value::<String>(&v).ok().map(|v| (k, v)))
                    .collect();
                out.push((id.id, fields));
            }
        }
        Ok(out)
    }

    /// Acknowledgement rule (§4.4): called after the background task has
    /// been enqueued *and* the Job's `backgroundTaskId` persisted, in the
    /// same unit of work as that persistence — so failure to ack means
    /// at-least-once redelivery stays intact.
    pub async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> Result<(), EventLogError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, &[entry_id]).await?;
        Ok(())
    }

    /// Entries pending (delivered, unacked) longer than `min_idle` for any
    /// consumer in `group` — candidates for the Recovery Supervisor or a
    /// restarted dispatcher to reclaim via `XCLAIM`.
    pub async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: std::time::Duration,
        count: usize,
    ) -> Result<Vec<(EntryId, Vec<(String, String)>)>, EventLogError> {
        let mut conn = self.conn.clone();
        let pending: redis::streams::StreamPendingCountReply = conn
            .xpending_count(stream, group, "-", "+", count as isize)
            .await?;

        let stale_ids: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.time_since_delivered >= min_idle.as_millis() as usize)
            .map(|p| p.id)
            .collect();

        if stale_ids.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: redis::streams::StreamClaimReply = conn
            .xclaim(stream, group, consumer, min_idle.as_millis() as usize, &stale_ids)
            .await?;

        let out = claimed
            .ids
            .into_iter()
            .map(|id| {
                let fields = id
                    .map
                    .into_iter()
                    .filter_map(|(k, v)| redis::from_redis_value::<String>(&v).ok().map(|v| (k, v)))
                    .collect();
                (id.id, fields)
            })
            .collect();
        Ok(out)
    }
}

/// Timestamp formatting shared by every stream entry's `createdAt` field
/// (§6 wire format: ISO-8601).
pub fn iso_now() -> String {
    Utc::now().to_rfc3339()
}
