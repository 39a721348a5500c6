//! S3 Mirror Store
//!
//! Implements MirrorStore on an S3-compatible bucket (AWS S3, MinIO,
//! Backblaze B2, ...). Metadata is stored as object user metadata.

use crate::domain::errors::MirrorError;
use crate::domain::ports::{prefixed_key, Metadata, MirrorReader, MirrorStore};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::path::Path;

/// S3-backed mirror store.
#[derive(Debug, Clone)]
pub struct S3MirrorStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3MirrorStore {
    /// Create a store for `bucket`.
    ///
    /// `endpoint` selects an S3-compatible service; path-style addressing is
    /// used so non-AWS services work without virtual-host DNS.
    pub fn new(
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(key_id, key_secret, None, None, "geoipd-config");
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            builder = builder.endpoint_url(endpoint_url);
        }
        Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.into(),
            prefix,
        }
    }

    fn full_key(&self, key: &str) -> String {
        prefixed_key(self.prefix.as_deref(), key)
    }

    /// HEAD the object; `Ok(None)` when it does not exist.
    async fn head(&self, key: &str) -> Result<Option<HeadObjectOutput>, MirrorError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;
        match result {
            Ok(output) => Ok(Some(output)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(MirrorError::Backend(
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }

    async fn head_existing(&self, key: &str) -> Result<HeadObjectOutput, MirrorError> {
        self.head(key)
            .await?
            .ok_or_else(|| MirrorError::NotFound(self.full_key(key)))
    }
}

#[async_trait]
impl MirrorStore for S3MirrorStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn exists(&self, key: &str) -> Result<bool, MirrorError> {
        Ok(self.head(key).await?.is_some())
    }

    async fn get_metadata(&self, key: &str) -> Result<Metadata, MirrorError> {
        let output = self.head_existing(key).await?;
        Ok(output.metadata().cloned().unwrap_or_default())
    }

    async fn download(&self, key: &str) -> Result<MirrorReader, MirrorError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await;
        match result {
            Ok(output) => Ok(Box::pin(output.body.into_async_read())),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                Err(MirrorError::NotFound(self.full_key(key)))
            }
            Err(e) => Err(MirrorError::Backend(
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }

    async fn upload_with_metadata(
        &self,
        key: &str,
        source: &Path,
        metadata: Metadata,
    ) -> Result<(), MirrorError> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| MirrorError::Backend(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(body)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| MirrorError::Backend(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn last_modified(&self, key: &str) -> Result<DateTime<Utc>, MirrorError> {
        let output = self.head_existing(key).await?;
        let modified = output
            .last_modified()
            .ok_or_else(|| MirrorError::Backend("object has no last-modified time".to_string()))?;
        DateTime::<Utc>::from_timestamp(modified.secs(), modified.subsec_nanos())
            .ok_or_else(|| MirrorError::Backend("last-modified time out of range".to_string()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn store(prefix: Option<&str>) -> S3MirrorStore {
        S3MirrorStore::new(
            "geoip-bucket",
            prefix.map(str::to_string),
            "us-east-1",
            Some("http://127.0.0.1:9000".to_string()),
            "key-id",
            "key-secret",
        )
    }

    #[test]
    fn test_full_key_without_prefix() {
        assert_eq!(store(None).full_key("GeoLite2-City.mmdb"), "GeoLite2-City.mmdb");
    }

    #[test]
    fn test_full_key_with_prefix() {
        assert_eq!(
            store(Some("mirror/")).full_key("GeoLite2-City.mmdb"),
            "mirror/GeoLite2-City.mmdb"
        );
    }

    #[test]
    fn test_name() {
        assert_eq!(store(None).name(), "s3");
    }
}
