//! The canonical S3 multipart part-upload loop (§4.8 step 6, §4.9 step 4):
//! split a file into fixed-size parts, upload each, collect `{partNumber,
//! etag}`, and finalize. Shared by the Sync Stage (the canonical mirror
//! path, per Open Question (b)) so there is exactly one multipart
//! implementation in the workspace.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use torreclou_core::error::TorreClouError;
use torreclou_core::transfer_progress::{PartETag, TransferProgress};

/// Whether an object already exists at `key` in `bucket` (§4.8 step 6
/// "Query the remote for pre-existing object of the same name").
pub async fn object_exists(client: &Client, bucket: &str, key: &str) -> Result<bool, TorreClouError> {
    match client.head_object().bucket(bucket).key(key).send().await {
        Ok(_) => Ok(true),
        Err(err) => {
            if let Some(service_err) = err.as_service_error() {
                if service_err.is_not_found() {
                    return Ok(false);
                }
            }
            Err(TorreClouError::S3Error(err.to_string()))
        }
    }
}

pub async fn initiate_multipart(client: &Client, bucket: &str, key: &str) -> Result<String, TorreClouError> {
    let output = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| TorreClouError::InitUploadFailed(e.to_string()))?;

    output.upload_id().map(str::to_string).ok_or_else(|| {
        TorreClouError::InitUploadFailed("provider did not return an upload id".to_string())
    })
}

/// Reads one fixed-size part from `path` at `part_number` (1-based) given
/// `part_size`, and uploads it, returning the part's etag.
pub async fn upload_part_from_file(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: i32,
    path: &str,
    part_size: i64,
) -> Result<PartETag, TorreClouError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| TorreClouError::ReadError(e.to_string()))?;

    let offset = (part_number as i64 - 1) * part_size;
    file.seek(std::io::SeekFrom::Start(offset as u64))
        .await
        .map_err(|e| TorreClouError::ReadError(e.to_string()))?;

    let mut buf = vec![0u8; part_size as usize];
    let mut total_read = 0usize;
    loop {
        let n = file.read(&mut buf[total_read..]).await.map_err(|e| TorreClouError::ReadError(e.to_string()))?;
        if n == 0 {
            break;
        }
        total_read += n;
        if total_read == buf.len() {
            break;
        }
    }
    buf.truncate(total_read);

    let output = client
        .upload_part()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .part_number(part_number)
        .body(ByteStream::from(buf))
        .send()
        .await
        .map_err(|e| TorreClouError::UploadPartFailed(e.to_string()))?;

    let etag = output
        .e_tag()
        .map(str::to_string)
        .ok_or_else(|| TorreClouError::UploadPartFailed("provider did not return an etag".to_string()))?;

    Ok(PartETag { part_number, etag })
}

pub async fn complete_multipart(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    parts: &[PartETag],
) -> Result<(), TorreClouError> {
    let completed_parts: Vec<CompletedPart> = parts
        .iter()
        .map(|p| CompletedPart::builder().e_tag(&p.etag).part_number(p.part_number).build())
        .collect();

    client
        .complete_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed_parts)).build())
        .send()
        .await
        .map_err(|e| TorreClouError::CompleteUploadFailed(e.to_string()))?;

    Ok(())
}

/// Total parts a file of `total_bytes` splits into at `part_size`
/// (§4.8 step 6 "Split the file into fixed-size parts (default 10 MiB)").
pub fn total_parts(total_bytes: i64, part_size: i64) -> i32 {
    if total_bytes == 0 {
        return 1;
    }
    ((total_bytes + part_size - 1) / part_size) as i32
}

/// Drives the full upload-or-resume loop for one file against an existing
/// `TransferProgress` row, starting from `progress.next_part_number()`
/// (§4.8 step 6 "Loop over part numbers starting from
/// max(existingParts.partNumber) + 1").
pub async fn upload_remaining_parts(
    client: &Client,
    bucket: &str,
    key: &str,
    local_path: &str,
    progress: &TransferProgress,
) -> Result<Vec<PartETag>, TorreClouError> {
    let mut new_parts = Vec::new();
    for part_number in progress.next_part_number()..=progress.total_parts {
        let part = upload_part_from_file(
            client,
            bucket,
            key,
            &progress.provider_upload_id,
            part_number,
            local_path,
            progress.part_size,
        )
        .await?;
        new_parts.push(part);
    }
    Ok(new_parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_parts_rounds_up() {
        assert_eq!(total_parts(100 * 1024 * 1024, 10 * 1024 * 1024), 10);
        assert_eq!(total_parts(105 * 1024 * 1024, 10 * 1024 * 1024), 11);
        assert_eq!(total_parts(0, 10 * 1024 * 1024), 1);
    }
}
