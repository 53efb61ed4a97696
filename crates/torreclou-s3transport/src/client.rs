//! Builds an `aws-sdk-s3` client from a `StorageProfile`'s opaque
//! `credentialsJson` (§6 "the core consumes ... `credentialsJson` to
//! authenticate"). S3-compatible buckets may set a custom endpoint (the
//! credentials blob carries it when present), matching the "S3-compatible
//! buckets" phrasing in §1.

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use serde::Deserialize;
use torreclou_core::error::TorreClouError;

#[derive(Debug, Deserialize)]
struct S3Credentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default = "default_region")]
    region: String,
    /// Present for S3-compatible (non-AWS) endpoints.
    endpoint_url: Option<String>,
    bucket: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

pub struct S3Target {
    pub client: Client,
    pub bucket: String,
}

/// Parses `credentialsJson` into static keys (§4.8 step 4: "S3 uses static
/// keys from the profile") and builds a client. Malformed JSON maps to
/// `InvalidCredentialsJson`.
pub fn build_s3_target(credentials_json: &serde_json::Value) -> Result<S3Target, TorreClouError> {
    let creds: S3Credentials =
        serde_json::from_value(credentials_json.clone()).map_err(|_| TorreClouError::InvalidCredentialsJson)?;

    let mut builder = aws_sdk_s3::config::Builder::new()
        .region(Region::new(creds.region))
        .credentials_provider(Credentials::new(creds.access_key_id, creds.secret_access_key, None, None, "torreclou"));

    if let Some(endpoint) = &creds.endpoint_url {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    let client = Client::from_conf(builder.build());
    Ok(S3Target { client, bucket: creds.bucket })
}
