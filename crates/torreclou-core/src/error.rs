//! Error taxonomy (§7). Every code here can be written into a
//! `StatusHistory.errorMessage` column and surfaced to the (external) API
//! collaborator; the `Display` impl is exactly the code name so it can be
//! pattern-matched back out of a persisted history row.

use thiserror::Error;

/// The full cross-cutting error taxonomy named in spec §7.
///
/// Stages and the dispatcher classify whatever transport/provider error they
/// hit into one of these before handing it to the Status Engine; nothing
/// upstream of a stage ever sees a raw `reqwest`/`redis`/`sqlx` error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TorreClouError {
    // --- Validation ---
    #[error("InvalidInfoHash")]
    InvalidInfoHash,
    #[error("InvalidFileName")]
    InvalidFileName,
    #[error("InvalidFileSize")]
    InvalidFileSize,
    #[error("V2OnlyNotSupported")]
    V2OnlyNotSupported,
    #[error("InvalidS3Config")]
    InvalidS3Config,
    #[error("InvalidCredentialsJson")]
    InvalidCredentialsJson,
    #[error("MissingRequiredFields")]
    MissingRequiredFields,
    #[error("InvalidProfile")]
    InvalidProfile,

    // --- Authorization ---
    #[error("Unauthorized")]
    Unauthorized,
    #[error("AccessDenied")]
    AccessDenied,
    #[error("InvalidCredentials")]
    InvalidCredentials,

    // --- Not found ---
    #[error("JobNotFound")]
    JobNotFound,
    #[error("UserNotFound")]
    UserNotFound,
    #[error("ProfileNotFound")]
    ProfileNotFound,
    #[error("FileNotFound")]
    FileNotFound,
    #[error("BucketNotFound")]
    BucketNotFound,
    #[error("TorrentNotFound")]
    TorrentNotFound,

    // --- Conflict ---
    #[error("JobAlreadyExists")]
    JobAlreadyExists,
    #[error("AlreadyDisconnected")]
    AlreadyDisconnected,
    #[error("JobNotCancellable")]
    JobNotCancellable,
    #[error("JobActive")]
    JobActive,
    #[error("JobRetrying")]
    JobRetrying,
    #[error("JobCompleted")]
    JobCompleted,
    #[error("JobCancelled")]
    JobCancelled,
    #[error("ProfileInUse")]
    ProfileInUse,

    // --- Resource state ---
    #[error("InactiveProfile")]
    InactiveProfile,
    #[error("NoCredentials")]
    NoCredentials,
    #[error("NoRefreshToken")]
    NoRefreshToken,

    // --- Provider / transport ---
    #[error("S3Error: {0}")]
    S3Error(String),
    #[error("BucketAccessDenied")]
    BucketAccessDenied,
    #[error("TokenExchangeFailed")]
    TokenExchangeFailed,
    #[error("RefreshFailed")]
    RefreshFailed,
    #[error("UploadPartFailed: {0}")]
    UploadPartFailed(String),
    #[error("CompleteUploadFailed: {0}")]
    CompleteUploadFailed(String),
    #[error("InitUploadFailed: {0}")]
    InitUploadFailed(String),
    #[error("ListPartsFailed: {0}")]
    ListPartsFailed(String),
    #[error("ReadError: {0}")]
    ReadError(String),

    // --- Status engine ---
    #[error("illegal transition from {from:?} to {to:?}")]
    IllegalTransition { from: String, to: String },

    // --- Terminal classifiers (carried on the Job, not raised as errors
    // themselves, but modeled here so callers can map into them) ---
    #[error("TORRENT_FAILED: {0}")]
    TorrentFailed(String),
    #[error("UPLOAD_FAILED: {0}")]
    UploadFailed(String),
    #[error("GOOGLE_DRIVE_FAILED: {0}")]
    GoogleDriveFailed(String),
    #[error("FAILED: {0}")]
    Failed(String),
}

impl TorreClouError {
    /// Whether this error is retryable at the stage level (routes through a
    /// `*_RETRY` status) versus terminal (routes directly to a `*_FAILED`
    /// status). See §7 "Propagation".
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TorreClouError::S3Error(_)
                | TorreClouError::UploadPartFailed(_)
                | TorreClouError::InitUploadFailed(_)
                | TorreClouError::ListPartsFailed(_)
                | TorreClouError::ReadError(_)
                | TorreClouError::TokenExchangeFailed
                | TorreClouError::RefreshFailed
        )
    }
}
