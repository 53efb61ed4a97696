//! Upload Stage (§4.8): both provider branches share the same entry
//! conditions and failure taxonomy, but their transports are different
//! enough (Drive's chunked resumable PUTs vs S3's discrete multipart parts,
//! owned by the Sync Stage) that each gets its own stage type rather than
//! one base class with provider conditionals sprinkled through it.

pub mod drive_stage;
pub mod drive_transport;
pub mod oauth;
pub mod progress_cache;
pub mod s3_stage;
pub mod transport;

pub use drive_stage::{DriveStage, DriveStageError};
pub use drive_transport::DriveTransport;
pub use oauth::{DriveCredentials, DriveTokenProvider};
pub use progress_cache::{DriveProgress, ProgressCache};
pub use s3_stage::{S3StageError, S3UploadStage};
pub use transport::{RemoteLocation, UploadTransport};
