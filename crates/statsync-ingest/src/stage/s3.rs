//! S3-compatible object store
//!
//! Works against AWS S3, MinIO, and the GCS interoperability endpoint. The
//! returned locator uses the configured scheme so a GCS bucket can be handed
//! to the warehouse as `gs://bucket/key`.

use super::ObjectStore;
use crate::config::S3Config;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{config::Region, error::DisplayErrorContext, primitives::ByteStream, Client};
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    locator_scheme: String,
}

impl S3ObjectStore {
    pub async fn new(config: &S3Config) -> Result<Self> {
        debug!("Initializing object store with config: {:?}", config);

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "statsync-storage");
                aws_sdk_s3::Config::builder().credentials_provider(credentials)
            },
            _ => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!(bucket = %config.bucket, "Object store client initialized");

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            locator_scheme: config.locator_scheme.clone(),
        })
    }

    pub fn locator(&self, key: &str) -> String {
        format!("{}://{}/{}", self.locator_scheme, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket))]
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        debug!("Uploading {} bytes to s3://{}/{}", body.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| IngestError::store(key, DisplayErrorContext(&e)))?;

        Ok(self.locator(key))
    }
}
