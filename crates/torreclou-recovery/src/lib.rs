//! Periodic scan for stuck Jobs/Syncs, reconciled against the background
//! task runtime's view of reality and re-dispatched with backoff.

pub mod backoff;
pub mod candidates;
pub mod routing;
pub mod supervisor;

pub use backoff::next_retry_at;
pub use candidates::{job_candidate, sync_candidate, CandidateKind};
pub use routing::{job_queue, sync_queue};
pub use supervisor::{RecoverySupervisor, StorageProfileLookup};
