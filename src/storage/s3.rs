//! AWS S3 image backend.
//!
//! Objects are written to `{prefix}/{stem}{ext}` with the fetched content type
//! and a long-lived cache directive. The returned reference is a public
//! virtual-hosted URL when a region is known, otherwise an `s3://` URI.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::models::S3Config;
use crate::storage::images::{ImageBackend, ImageObject};

/// S3-based image storage.
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
    region: Option<String>,
    cache_control: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, config: &S3Config) -> Result<Self> {
        Ok(Self {
            client,
            bucket: required_bucket(config)?,
            prefix: config.prefix.clone(),
            region: config.region.clone(),
            cache_control: config.cache_control.clone(),
        })
    }

    /// Create S3 storage using the default AWS credential chain.
    pub async fn from_config(config: &S3Config) -> Result<Self> {
        required_bucket(config)?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config), config)
    }

    fn object_key(&self, object: &ImageObject<'_>) -> String {
        object_key(&self.prefix, &object.file_name())
    }
}

fn required_bucket(config: &S3Config) -> Result<String> {
    config
        .bucket
        .clone()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::config("S3_BUCKET is required for IMAGE_BACKEND=s3"))
}

/// `{prefix}/{name}`, or just `{name}` for an empty prefix.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

/// Public location of an object.
pub fn public_url(bucket: &str, region: Option<&str>, key: &str) -> String {
    match region.filter(|r| !r.is_empty()) {
        Some(region) => format!("https://{bucket}.s3.{region}.amazonaws.com/{key}"),
        None => format!("s3://{bucket}/{key}"),
    }
}

#[async_trait]
impl ImageBackend for S3Storage {
    async fn put(
        &self,
        object: &ImageObject<'_>,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<String> {
        let key = self.object_key(object);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .cache_control(&self.cache_control);
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .map_err(|e| AppError::S3(e.into_service_error().to_string()))?;

        log::debug!("Wrote s3://{}/{}", self.bucket, key);
        Ok(public_url(&self.bucket, self.region.as_deref(), &key))
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("getmarks", "q_0001_ab.png"), "getmarks/q_0001_ab.png");
        assert_eq!(object_key("getmarks/", "q_0001_ab.png"), "getmarks/q_0001_ab.png");
        assert_eq!(object_key("", "q_0001_ab.png"), "q_0001_ab.png");
    }

    #[test]
    fn test_public_url_with_region() {
        assert_eq!(
            public_url("assets", Some("ap-south-1"), "getmarks/q.png"),
            "https://assets.s3.ap-south-1.amazonaws.com/getmarks/q.png"
        );
    }

    #[test]
    fn test_public_url_without_region() {
        assert_eq!(public_url("assets", None, "getmarks/q.png"), "s3://assets/getmarks/q.png");
        assert_eq!(public_url("assets", Some(""), "k"), "s3://assets/k");
    }
}
