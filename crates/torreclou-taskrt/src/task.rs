//! The `tasks` table row shape and the descriptor callers pass when
//! registering work (§4.6, §9 "Attribute-driven retry policy ... becomes an
//! explicit task-descriptor record passed to the runtime when the task is
//! registered; no magic decoration is required").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Runtime-level lifecycle of one task attempt sequence. Distinct from the
/// Job/Sync status sets in `torreclou-core` — this is execution-envelope
/// state, not domain state (§ Glossary "Background task").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaskState {
    Enqueued,
    Scheduled,
    Processing,
    Succeeded,
    Failed,
    Deleted,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Enqueued => "Enqueued",
            TaskState::Scheduled => "Scheduled",
            TaskState::Processing => "Processing",
            TaskState::Succeeded => "Succeeded",
            TaskState::Failed => "Failed",
            TaskState::Deleted => "Deleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "Enqueued" => TaskState::Enqueued,
            "Scheduled" => TaskState::Scheduled,
            "Processing" => TaskState::Processing,
            "Succeeded" => TaskState::Succeeded,
            "Failed" => TaskState::Failed,
            "Deleted" => TaskState::Deleted,
            _ => return None,
        })
    }
}

/// What a caller hands the runtime to register one unit of work (§4.6):
/// which queue, which job it belongs to (so the state-election hook can
/// find the job to fail), arbitrary arguments, and the attempt/backoff
/// schedule for this particular task.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub queue: String,
    pub job_id: i64,
    pub args: Value,
    pub max_attempts: i32,
}

/// One row of the `tasks` table.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: i64,
    pub queue: String,
    pub job_id: i64,
    pub args: Value,
    pub state: TaskState,
    pub attempt: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Default per-attempt delay schedule (§4.6 default `60s, 300s, 900s`).
pub fn default_retry_delays() -> Vec<Duration> {
    vec![Duration::from_secs(60), Duration::from_secs(300), Duration::from_secs(900)]
}

/// Delay before the next attempt, given how many attempts have already run.
/// `attempts_made` is 1-based (1 = the attempt that just failed). Falls back
/// to the last configured delay once the schedule is exhausted but attempts
/// remain, rather than retrying immediately.
pub fn delay_for_attempt(delays: &[Duration], attempts_made: i32) -> Duration {
    let idx = (attempts_made.saturating_sub(1)).max(0) as usize;
    delays.get(idx).copied().unwrap_or_else(|| *delays.last().unwrap_or(&Duration::from_secs(900)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_schedule_matches_spec_default() {
        let delays = default_retry_delays();
        assert_eq!(delay_for_attempt(&delays, 1), Duration::from_secs(60));
        assert_eq!(delay_for_attempt(&delays, 2), Duration::from_secs(300));
        assert_eq!(delay_for_attempt(&delays, 3), Duration::from_secs(900));
        // Schedule exhausted but callers may still configure more attempts.
        assert_eq!(delay_for_attempt(&delays, 4), Duration::from_secs(900));
    }
}
