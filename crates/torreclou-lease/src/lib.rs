//! Distributed Lease (§4.3): a named Redis lock with a per-key TTL, used so
//! that at most one worker process executes a given job's upload/sync stage
//! at a time. Generalizes the teacher's in-process `JobControl` abort
//! registry (`control.rs`) — a shared table of per-job tokens guarded by a
//! lock — to a registry visible across hosts, backed by Redis instead of an
//! in-memory `RwLock<HashMap<..>>`.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// A held lease. Dropping this without calling `release` leaves the key to
/// expire on its own TTL — correct, if slower, behavior for a crashed worker.
#[derive(Debug, Clone)]
pub struct Lease {
    pub key: String,
    pub token: String,
}

/// Lock keys named in §4.3: `gdrive:lock:<jobId>`, `s3:lock:<jobId>`.
pub fn drive_lock_key(job_id: i64) -> String {
    format!("gdrive:lock:{job_id}")
}

pub fn s3_lock_key(job_id: i64) -> String {
    format!("s3:lock:{job_id}")
}

/// Release is compare-and-delete on the token (§4.3), so an expired lease
/// can never be released by its original holder out from under a new one.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Renew extends the TTL only while the caller still holds the token, same
/// CAS discipline as release.
const RENEW_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct LeaseManager {
    conn: ConnectionManager,
}

impl LeaseManager {
    pub async fn connect(redis_url: &str) -> Result<Self, LeaseError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// `acquire(key, ttl) -> lease | None` (§4.3). Uses `SET key token NX PX
    /// ttl_ms`; a `None` result means another worker holds it — per §4.3
    /// "Failure mode", the caller logs and returns success to the task
    /// runtime rather than retrying.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<Lease>, LeaseError> {
        let token = new_token();
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(acquired.map(|_| Lease { key: key.to_string(), token }))
    }

    pub async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<bool, LeaseError> {
        let mut conn = self.conn.clone();
        let result: i32 = redis::Script::new(RENEW_SCRIPT)
            .key(&lease.key)
            .arg(&lease.token)
            .arg(ttl.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(result == 1)
    }

    pub async fn release(&self, lease: &Lease) -> Result<bool, LeaseError> {
        let mut conn = self.conn.clone();
        let result: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&lease.key)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(result == 1)
    }

    /// Admin-only unconditional delete, bypassing the CAS check — used by
    /// the Recovery Supervisor when a lease's holder is known to be dead and
    /// its token was never observed.
    pub async fn delete(&self, key: &str) -> Result<(), LeaseError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

fn new_token() -> String {
    // Distinguishes this holder from any future holder of the same key once
    // the TTL has expired and someone else has acquired it.
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_match_spec_naming() {
        assert_eq!(drive_lock_key(42), "gdrive:lock:42");
        assert_eq!(s3_lock_key(42), "s3:lock:42");
    }
}
