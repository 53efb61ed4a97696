//! Job Store (§4.1): a transactional Postgres repository over Job, Sync,
//! StatusHistory, and TransferProgress records, the Postgres analog of the
//! teacher's `ResumeDb` (`open_default`/`migrate`/narrow query methods
//! returning typed rows), generalized to the five tables of §3.

pub mod jobs;
pub mod pool;
pub mod profiles;
pub mod requested_files;
pub mod rows;
pub mod syncs;
pub mod transfer_progress;

pub use jobs::{JobFilter, JobStore};
pub use pool::connect_and_migrate;
pub use profiles::ProfileStore;
pub use requested_files::RequestedFileStore;
pub use syncs::SyncStore;
pub use transfer_progress::TransferProgressStore;
