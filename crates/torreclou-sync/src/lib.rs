//! Sync Stage (§4.9): the canonical S3 multipart mirror path, triggered by
//! the S3 Upload Stage's handoff via `sync:stream`.

pub mod files;
pub mod stage;

pub use files::{enumerate_files, s3_key, LocalFile};
pub use stage::{SyncStage, SyncStageError};
