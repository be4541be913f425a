use std::time::Duration;

use anyhow::{Context, Result};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use tracing::{debug, instrument};

use super::RecordingStore;
use crate::config::{Secrets, StorageConfig};
use crate::metrics::{MetricsRegistry, Outcome, StorageOperation};

/// S3 bucket the recording vendor uploads into.
pub struct S3RecordingStore {
    pub client: Client,
    pub bucket: String,
    pub region: String,
    pub presigned_url_ttl: Duration,
    metrics: Option<MetricsRegistry>,
}

impl S3RecordingStore {
    pub fn new(client: Client, config: &StorageConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            presigned_url_ttl: Duration::from_secs(config.presigned_url_ttl),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn observe<T>(&self, operation: StorageOperation, result: &Result<T>) {
        if let Some(m) = &self.metrics {
            m.metrics.observe_storage(operation, Outcome::from(result));
        }
    }
}

/// Build an S3 client for the configured bucket region.
///
/// Static bucket keys take precedence; without them the default AWS
/// credential chain (env, profile, IMDS) is used.
pub async fn build_client(config: &StorageConfig, secrets: &Secrets) -> Client {
    let mut loader = aws_config::from_env().region(aws_config::Region::new(config.region.clone()));

    if let Some((access_key, secret_key)) = &secrets.bucket_keys {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "recgate-config",
        ));
    }

    let aws_config = loader.load().await;

    let mut s3_config = aws_sdk_s3::config::Builder::from(&aws_config);
    if let Some(endpoint) = &config.endpoint_url {
        s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
    }
    Client::from_conf(s3_config.build())
}

#[async_trait::async_trait]
impl RecordingStore for S3RecordingStore {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let result = list_objects(&self.client, &self.bucket, prefix).await;
        self.observe(StorageOperation::List, &result);
        result
    }

    async fn presigned_url(&self, key: &str) -> Result<String> {
        let result = generate_presigned_url(
            &self.client,
            &self.bucket,
            key,
            self.presigned_url_ttl.as_secs(),
        )
        .await;
        self.observe(StorageOperation::Presign, &result);
        result
    }

    fn public_url(&self, key: &str) -> String {
        public_object_url(&self.bucket, &self.region, key)
    }

    async fn ping(&self) -> Result<()> {
        let result = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .context("S3 HeadBucket");
        self.observe(StorageOperation::Ping, &result);
        result
    }
}

// ---------------------------------------------------------------------------
// Free functions — operate on explicit bucket / key parameters.
// ---------------------------------------------------------------------------

/// Virtual-hosted-style URL of an object.  Only readable when the bucket or
/// object is public; use [`generate_presigned_url`] otherwise.
///
/// Each `/`-separated key segment is percent-encoded.
pub fn public_object_url(bucket: &str, region: &str, key: &str) -> String {
    let path = key
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/");
    format!("https://{bucket}.s3.{region}.amazonaws.com/{path}")
}

/// Generate a pre-signed GET URL for an S3 object.
#[instrument(skip(client), fields(%bucket, %key, ttl_secs))]
pub async fn generate_presigned_url(
    client: &Client,
    bucket: &str,
    key: &str,
    ttl_secs: u64,
) -> Result<String> {
    let presigning = PresigningConfig::builder()
        .expires_in(Duration::from_secs(ttl_secs))
        .build()
        .context("build PresigningConfig")?;

    let req = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .presigned(presigning)
        .await
        .context("generate presigned URL")?;

    let url = req.uri().to_string();
    debug!("presigned URL generated");
    Ok(url)
}

/// List all object keys under a given prefix.
///
/// Automatically paginates through all results.
#[instrument(skip(client), fields(%bucket, %prefix))]
pub async fn list_objects(client: &Client, bucket: &str, prefix: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let mut req = client.list_objects_v2().bucket(bucket).prefix(prefix);

        if let Some(ref token) = continuation_token {
            req = req.continuation_token(token);
        }

        let resp = req.send().await.context("S3 ListObjectsV2")?;

        for obj in resp.contents() {
            if let Some(k) = obj.key() {
                keys.push(k.to_string());
            }
        }

        match resp.next_continuation_token() {
            Some(token) => {
                continuation_token = Some(token.to_string());
            }
            None => break,
        }
    }

    debug!(count = keys.len(), "listed objects");
    Ok(keys)
}
