//! Agora Cloud Recording REST backend.
//!
//! Every call is a single JSON request authenticated with HTTP Basic auth
//! (customer id / customer secret) against
//! `{api_url}/v1/apps/{app_id}/cloud_recording/...`.

use std::time::Instant;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::types::{
    AcquireClientRequest, AcquireResponse, QueryResponse, RecordingConfigBody,
    StartClientRequest, StartResponse, StopClientRequest, StorageConfigBody, VendorRequest,
};
use super::{RecordingApi, StartParams, VendorError};
use crate::config::{Config, Secrets};
use crate::metrics::{MetricsRegistry, Outcome, VendorOperation};

// ---------------------------------------------------------------------------
// Backend struct
// ---------------------------------------------------------------------------

pub struct AgoraRecordingApi {
    http_client: reqwest::Client,
    api_url: String,
    app_id: String,
    customer_id: String,
    customer_secret: String,
    recording: crate::config::RecordingConfig,
    bucket: String,
    bucket_keys: Option<(String, String)>,
    metrics: Option<MetricsRegistry>,
}

impl AgoraRecordingApi {
    pub fn new(http_client: reqwest::Client, config: &Config, secrets: &Secrets) -> Self {
        Self {
            http_client,
            api_url: config.vendor.api_url.trim_end_matches('/').to_string(),
            app_id: config.vendor.app_id.clone(),
            customer_id: secrets.customer_id.clone(),
            customer_secret: secrets.customer_secret.clone(),
            recording: config.recording.clone(),
            bucket: config.storage.bucket.clone(),
            bucket_keys: secrets.bucket_keys.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn bucket_keys(&self) -> Result<(String, String)> {
        self.bucket_keys
            .clone()
            .context("bucket access keys are required to start a recording")
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/apps/{}/cloud_recording/{path}",
            self.api_url, self.app_id
        )
    }

    fn session_url(&self, rid: &str, sid: &str, action: &str) -> String {
        self.url(&format!(
            "resourceid/{rid}/sid/{sid}/mode/{}/{action}",
            self.recording.mode
        ))
    }

    /// Send an authenticated request and decode a 2xx JSON reply.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: VendorOperation,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let started = Instant::now();
        let result = self.execute(operation.as_str(), request).await;

        if let Some(m) = &self.metrics {
            m.metrics.observe_vendor(
                operation,
                Outcome::from(&result),
                started.elapsed().as_secs_f64(),
            );
        }
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let resp = request
            .basic_auth(&self.customer_id, Some(&self.customer_secret))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .with_context(|| format!("cloud recording {operation} request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unreadable>"));
            warn!(operation, %status, %body, "cloud recording API returned non-success");
            return Err(VendorError::Status {
                operation,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("failed to parse cloud recording {operation} response"))
    }
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl RecordingApi for AgoraRecordingApi {
    fn ensure_ready(&self) -> Result<()> {
        self.bucket_keys().map(|_| ())
    }

    #[instrument(skip(self))]
    async fn acquire(&self, channel: &str, uid: u32) -> Result<String> {
        let body = VendorRequest::new(
            channel,
            uid,
            AcquireClientRequest {
                resource_expired_hour: self.recording.resource_expired_hour,
            },
        );
        let request = self.http_client.post(self.url("acquire")).json(&body);

        let resp: AcquireResponse = self.call(VendorOperation::Acquire, request).await?;
        let rid = resp.resource_id.ok_or(VendorError::MissingField {
            operation: "acquire",
            field: "resourceId",
        })?;

        debug!(%rid, "resource acquired");
        Ok(rid)
    }

    #[instrument(skip(self, params), fields(channel = %params.channel, rid = %params.rid))]
    async fn start(&self, params: &StartParams<'_>) -> Result<String> {
        let (access_key, secret_key) = self.bucket_keys()?;

        let body = VendorRequest::new(
            params.channel,
            params.uid,
            StartClientRequest {
                token: params.token.to_string(),
                recording_config: RecordingConfigBody::from(&self.recording),
                storage_config: StorageConfigBody {
                    vendor: self.recording.storage_vendor,
                    region: self.recording.storage_region,
                    bucket: self.bucket.clone(),
                    access_key,
                    secret_key,
                    file_name_prefix: vec![
                        params.channel.to_string(),
                        params.timestamp.to_string(),
                    ],
                },
            },
        );
        let url = self.url(&format!(
            "resourceid/{}/mode/{}/start",
            params.rid, self.recording.mode
        ));
        let request = self.http_client.post(url).json(&body);

        let resp: StartResponse = self.call(VendorOperation::Start, request).await?;
        if let Some(returned) = resp.resource_id.as_deref() {
            if returned != params.rid {
                warn!(sent = %params.rid, %returned, "start replied with a different resource id");
            }
        }
        let sid = resp.sid.ok_or(VendorError::MissingField {
            operation: "start",
            field: "sid",
        })?;

        debug!(%sid, "recording session started");
        Ok(sid)
    }

    #[instrument(skip(self))]
    async fn stop(
        &self,
        channel: &str,
        uid: u32,
        rid: &str,
        sid: &str,
    ) -> Result<serde_json::Value> {
        let body = VendorRequest::new(channel, uid, StopClientRequest::default());
        let request = self
            .http_client
            .post(self.session_url(rid, sid, "stop"))
            .json(&body);

        let resp: serde_json::Value = self.call(VendorOperation::Stop, request).await?;
        debug!("recording session stopped");
        Ok(resp)
    }

    #[instrument(skip(self))]
    async fn query(&self, rid: &str, sid: &str) -> Result<QueryResponse> {
        let request = self.http_client.get(self.session_url(rid, sid, "query"));
        self.call(VendorOperation::Query, request).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
