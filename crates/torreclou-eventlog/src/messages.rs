//! Exact field sets for the three durable streams (§6 "Durable streams
//! (wire)"). Each entry is string key/value pairs within one stream entry —
//! Redis Streams fields have no native integer type, so every numeric field
//! round-trips through its string representation.

use crate::{iso_now, EventLogError};

fn field(fields: &[(String, String)], name: &str) -> Result<String, EventLogError> {
    fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| EventLogError::Malformed(format!("missing field {name:?}")))
}

fn parse_i64(fields: &[(String, String)], name: &str) -> Result<i64, EventLogError> {
    field(fields, name)?
        .parse()
        .map_err(|_| EventLogError::Malformed(format!("field {name:?} is not an integer")))
}

/// `jobs:stream` entry: `jobId=<int>` (§4.4, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsStreamEntry {
    pub job_id: i64,
}

impl JobsStreamEntry {
    pub fn new(job_id: i64) -> Self {
        Self { job_id }
    }

    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![("jobId", self.job_id.to_string())]
    }

    pub fn from_fields(fields: &[(String, String)]) -> Result<Self, EventLogError> {
        Ok(Self { job_id: parse_i64(fields, "jobId")? })
    }
}

/// `uploads:<provider>:stream` entry (§4.4, §6): `jobId, downloadPath,
/// storageProfileId, userId, createdAt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadsStreamEntry {
    pub job_id: i64,
    pub download_path: String,
    pub storage_profile_id: i64,
    pub user_id: i64,
    pub created_at: String,
}

impl UploadsStreamEntry {
    pub fn new(job_id: i64, download_path: impl Into<String>, storage_profile_id: i64, user_id: i64) -> Self {
        Self {
            job_id,
            download_path: download_path.into(),
            storage_profile_id,
            user_id,
            created_at: iso_now(),
        }
    }

    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("jobId", self.job_id.to_string()),
            ("downloadPath", self.download_path.clone()),
            ("storageProfileId", self.storage_profile_id.to_string()),
            ("userId", self.user_id.to_string()),
            ("createdAt", self.created_at.clone()),
        ]
    }

    pub fn from_fields(fields: &[(String, String)]) -> Result<Self, EventLogError> {
        Ok(Self {
            job_id: parse_i64(fields, "jobId")?,
            download_path: field(fields, "downloadPath")?,
            storage_profile_id: parse_i64(fields, "storageProfileId")?,
            user_id: parse_i64(fields, "userId")?,
            created_at: field(fields, "createdAt")?,
        })
    }
}

/// `sync:stream` entry: `jobId, syncId` (§4.4, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStreamEntry {
    pub job_id: i64,
    pub sync_id: i64,
}

impl SyncStreamEntry {
    pub fn new(job_id: i64, sync_id: i64) -> Self {
        Self { job_id, sync_id }
    }

    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![("jobId", self.job_id.to_string()), ("syncId", self.sync_id.to_string())]
    }

    pub fn from_fields(fields: &[(String, String)]) -> Result<Self, EventLogError> {
        Ok(Self {
            job_id: parse_i64(fields, "jobId")?,
            sync_id: parse_i64(fields, "syncId")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_entry_round_trips() {
        let entry = JobsStreamEntry::new(42);
        let fields: Vec<(String, String)> =
            entry.to_fields().into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        assert_eq!(JobsStreamEntry::from_fields(&fields).unwrap(), entry);
    }

    #[test]
    fn uploads_entry_round_trips() {
        let entry = UploadsStreamEntry::new(7, "/data/7", 3, 9);
        let fields: Vec<(String, String)> =
            entry.to_fields().into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        assert_eq!(UploadsStreamEntry::from_fields(&fields).unwrap(), entry);
    }

    #[test]
    fn missing_field_is_malformed() {
        let err = JobsStreamEntry::from_fields(&[]).unwrap_err();
        assert!(matches!(err, EventLogError::Malformed(_)));
    }
}
