#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! S3-compatible object store for the metric definitions baseline.
//!
//! The baseline is a single JSON object under one bucket/key. A missing
//! object reads as "no baseline yet". Credentials come from the AWS default
//! provider chain (`AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, profile,
//! instance role); an explicit endpoint allows non-AWS S3 implementations.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use data_alerts_definitions::{BaselineError, BaselineStore, MetricDefinitions};

/// Default bucket holding the baseline.
pub const DEFAULT_BUCKET: &str = "investigations-data-dev";

/// Default object key of the baseline.
pub const DEFAULT_KEY: &str = "uk-coronavirus-data-alerts/metrics.json";

/// Default AWS region of the bucket.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Errors that can occur during object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// S3 `GetObject` failed.
    #[error("Failed to download s3://{bucket}/{key}: {source}")]
    Download {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<StoreError> for BaselineError {
    fn from(e: StoreError) -> Self {
        let location = match &e {
            StoreError::Download { bucket, key, .. } | StoreError::Upload { bucket, key, .. } => {
                format!("s3://{bucket}/{key}")
            }
        };
        Self::Backend {
            location,
            source: Box::new(e),
        }
    }
}

/// Where the baseline object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// AWS region.
    pub region: String,
    /// Custom endpoint for S3-compatible stores.
    pub endpoint_url: Option<String>,
}

impl Default for S3Location {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            key: DEFAULT_KEY.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
        }
    }
}

impl std::fmt::Display for S3Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Baseline store backed by one S3 object.
pub struct S3BaselineStore {
    client: aws_sdk_s3::Client,
    location: S3Location,
}

impl S3BaselineStore {
    /// Builds a client from the default AWS configuration chain.
    pub async fn connect(location: S3Location) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(location.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &location.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::with_client(aws_sdk_s3::Client::from_conf(builder.build()), location)
    }

    /// Uses an existing client.
    #[must_use]
    pub const fn with_client(client: aws_sdk_s3::Client, location: S3Location) -> Self {
        Self { client, location }
    }

    async fn download(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let S3Location { bucket, key, .. } = &self.location;
        log::info!("Downloading metrics from {}...", self.location);

        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetObjectError::is_no_such_key)
                {
                    return Ok(None);
                }
                return Err(StoreError::Download {
                    bucket: bucket.clone(),
                    key: key.clone(),
                    source: Box::new(err),
                });
            }
        };

        let bytes = output.body.collect().await.map_err(|e| StoreError::Download {
            bucket: bucket.clone(),
            key: key.clone(),
            source: Box::new(e),
        })?;

        Ok(Some(bytes.into_bytes().to_vec()))
    }

    async fn upload(&self, body: Vec<u8>) -> Result<(), StoreError> {
        let S3Location { bucket, key, .. } = &self.location;
        log::info!("Uploading metrics to {} ({} bytes)...", self.location, body.len());

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StoreError::Upload {
                bucket: bucket.clone(),
                key: key.clone(),
                source: Box::new(e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl BaselineStore for S3BaselineStore {
    fn location(&self) -> String {
        self.location.to_string()
    }

    async fn read_baseline(&self) -> Result<Option<MetricDefinitions>, BaselineError> {
        let Some(bytes) = self.download().await? else {
            return Ok(None);
        };
        Ok(Some(MetricDefinitions::from_json_slice(&bytes)?))
    }

    async fn write_baseline(&self, definitions: &MetricDefinitions) -> Result<(), BaselineError> {
        self.upload(definitions.to_json_vec()?).await?;
        Ok(())
    }
}
