//! StatusHistory (§3): the append-only audit log written by the Status
//! Engine for both Job and Sync entities. Same shape for both, distinguished
//! by which id column is populated (`torreclou-store` keeps them in two
//! tables; this type is the shared in-memory shape).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::TransitionSource;

/// One row of a Job's or Sync's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub parent_id: i64,
    pub from_status: Option<String>,
    pub to_status: String,
    pub source: TransitionSource,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub changed_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    /// Invariant: `entry[i].fromStatus == entry[i-1].toStatus`, except the
    /// initial entry where `fromStatus` is null.
    pub fn is_initial(&self) -> bool {
        self.from_status.is_none()
    }

    /// Checks the consecutive-entry invariant against the entry that came
    /// immediately before this one in the same parent's history.
    pub fn follows(&self, previous: &StatusHistoryEntry) -> bool {
        self.from_status.as_deref() == Some(previous.to_status.as_str())
            && self.changed_at >= previous.changed_at
    }
}
