//! Bucket-access probe (§4.8 step 4: "S3 uses static keys from the profile,
//! with a ListObjects probe to validate bucket access (Forbidden ->
//! AccessDenied; NotFound -> BucketNotFound)").

use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Error;
use aws_sdk_s3::Client;
use torreclou_core::error::TorreClouError;

pub async fn probe_bucket_access(client: &Client, bucket: &str) -> Result<(), TorreClouError> {
    let result = client.list_objects_v2().bucket(bucket).max_keys(1).send().await;

    match result {
        Ok(_) => Ok(()),
        Err(err) => {
            if let Some(service_err) = err.as_service_error() {
                match service_err {
                    ListObjectsV2Error::NoSuchBucket(_) => return Err(TorreClouError::BucketNotFound),
                    _ => {}
                }
                if let Some(code) = service_err.meta().code() {
                    if code == "AccessDenied" || code == "Forbidden" {
                        return Err(TorreClouError::AccessDenied);
                    }
                }
            }
            Err(TorreClouError::S3Error(err.to_string()))
        }
    }
}
