use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{error::DisplayErrorContext, presigning::PresigningConfig};
use domain::Error;
use serde::Serialize;

#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub upload_url: String,
    /// Object key to send back as `prescriptionFile`.
    pub key: String,
}

/// Hands out one-shot upload URLs for prescription images.
#[async_trait]
pub trait UploadSigner: Send + Sync {
    async fn sign(&self, key: &str, content_type: &str) -> Result<UploadTicket, Error>;
}

pub fn prescription_key(patient_id: &str, file_name: &str) -> String {
    let file_name: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("prescriptions/{}/{}-{}", patient_id, ulid::Ulid::new(), file_name)
}

pub struct S3Uploads {
    client: aws_sdk_s3::Client,
    bucket: String,
    expires_in: Duration,
}

impl S3Uploads {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, expires_in: Duration) -> Self {
        Self {
            client,
            bucket,
            expires_in,
        }
    }
}

#[async_trait]
impl UploadSigner for S3Uploads {
    async fn sign(&self, key: &str, content_type: &str) -> Result<UploadTicket, Error> {
        let presigning = PresigningConfig::expires_in(self.expires_in).map_err(Error::store)?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|err| Error::store(DisplayErrorContext(err)))?;

        Ok(UploadTicket {
            upload_url: presigned.uri().to_string(),
            key: key.to_string(),
        })
    }
}

/// Local runs have no bucket; the URL only names the key.
pub struct LocalUploads;

#[async_trait]
impl UploadSigner for LocalUploads {
    async fn sign(&self, key: &str, _content_type: &str) -> Result<UploadTicket, Error> {
        Ok(UploadTicket {
            upload_url: format!("memory://prescriptions/{key}"),
            key: key.to_string(),
        })
    }
}
