//! Opaque integer identifiers for the entities in §3 of the data model.

/// Identity of a Job row.
pub type JobId = i64;
/// Identity of a Sync row (at most one per Job).
pub type SyncId = i64;
/// Identity of the read-only `User` reference.
pub type UserId = i64;
/// Identity of the read-only `StorageProfile` reference.
pub type StorageProfileId = i64;
/// Identity of the read-only `RequestedFile` reference.
pub type RequestedFileId = i64;
/// Opaque handle into the background task runtime (§4.6).
pub type BackgroundTaskId = i64;
