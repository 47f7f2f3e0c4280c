//! S3 storage service for asset uploads.
//!
//! Supports both AWS S3 and MinIO for development. Objects are keyed
//! `<category>/<file name>`; file names already carry the request-id or
//! content-hash prefix, so keys never collide across requests.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use tracing::{info, warn};

use crate::config::StorageSettings;
use crate::error::{AppError, AppResult};

/// Storage destination of an asset, decided by the archive group it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
    /// Image group file, request-id prefixed
    Image,
    /// Preset group file, content-addressed
    Auxiliary,
    /// Any other non-manifest file
    Unrecognized,
}

impl AssetCategory {
    /// Key prefix for this category.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Image => "img",
            Self::Auxiliary => "psf",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Object key for a file of this category.
    pub fn key_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.prefix(), file_name)
    }
}

/// Object store operations used by the upload dispatcher.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn object_exists(&self, key: &str) -> AppResult<bool>;

    /// Upload an object and return its location.
    async fn put_object(&self, key: &str, data: Vec<u8>) -> AppResult<String>;
}

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    endpoint: Option<String>,
    region: String,
}

impl Storage {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &StorageSettings) -> AppResult<Self> {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "ingest");

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        // Use custom endpoint for MinIO in development
        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        let storage = Self {
            client,
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
        };

        // Verify bucket exists or create it
        storage.ensure_bucket_exists().await?;

        info!("S3 storage initialized: bucket={}", config.bucket);

        Ok(storage)
    }

    /// Ensure the bucket exists, creating it if necessary.
    async fn ensure_bucket_exists(&self) -> AppResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    info!("Creating S3 bucket '{}'", self.bucket);
                    self.client
                        .create_bucket()
                        .bucket(&self.bucket)
                        .send()
                        .await
                        .map_err(|e| {
                            AppError::Storage(format!("Failed to create bucket: {}", e))
                        })?;
                    Ok(())
                } else {
                    Err(AppError::Storage(format!(
                        "Failed to access bucket '{}': {}",
                        self.bucket, service_error
                    )))
                }
            }
        }
    }

    /// Get the content type for a file based on its extension.
    pub fn content_type_for_key(key: &str) -> &'static str {
        let extension = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
        match extension.to_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "json" | "psf" => "application/json",
            _ => "application/octet-stream",
        }
    }

    /// Path-style URL of an object.
    pub fn object_url(&self, key: &str) -> String {
        let encoded = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        match self.endpoint {
            Some(ref endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                encoded
            ),
            None => format!(
                "https://s3.{}.amazonaws.com/{}/{}",
                self.region, self.bucket, encoded
            ),
        }
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn object_exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    warn!(key = %key, "HeadObject failed: {}", service_error);
                    Err(AppError::Storage(format!(
                        "Failed to check object '{}': {}",
                        key, service_error
                    )))
                }
            }
        }
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> AppResult<String> {
        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(Self::content_type_for_key(key))
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload '{}' to S3: {}", key, e)))?;

        Ok(self.object_url(key))
    }
}
