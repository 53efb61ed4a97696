//! Shared S3-compatible transport (§4.8, §4.9): building a client from a
//! storage profile, probing bucket access, and the one canonical multipart
//! upload loop. The Sync Stage is the only caller that drives a transfer to
//! completion; the Upload Stage's S3 branch only probes and hands off.

pub mod client;
pub mod multipart;
pub mod probe;

pub use client::{build_s3_target, S3Target};
pub use multipart::{
    complete_multipart, initiate_multipart, object_exists, total_parts, upload_part_from_file,
    upload_remaining_parts,
};
pub use probe::probe_bucket_access;
