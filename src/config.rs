use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub vendor: VendorConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Attach a permissive CORS layer so browser clients can call the API.
    #[serde(default = "bool_true")]
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors_allow_any: true,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn bool_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Vendor (cloud recording REST API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct VendorConfig {
    /// Root URL of the vendor REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Vendor application identifier (32 hex characters).
    pub app_id: String,
    /// Name of the environment variable that holds the app certificate used
    /// to sign RTC / RTM tokens.
    #[serde(default = "default_app_certificate_env")]
    pub app_certificate_env: String,
    /// Name of the environment variable that holds the REST customer id.
    #[serde(default = "default_customer_id_env")]
    pub customer_id_env: String,
    /// Name of the environment variable that holds the REST customer secret.
    #[serde(default = "default_customer_secret_env")]
    pub customer_secret_env: String,
    /// Per-request timeout for vendor API calls, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.agora.io".to_string()
}

fn default_app_certificate_env() -> String {
    "AGORA_APP_CERTIFICATE".to_string()
}

fn default_customer_id_env() -> String {
    "AGORA_CUSTOMER_ID".to_string()
}

fn default_customer_secret_env() -> String {
    "AGORA_CUSTOMER_SECRET".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Recording parameters sent with every start call
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// Recording mode path segment: `mix`, `individual` or `web`.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_resource_expired_hour")]
    pub resource_expired_hour: u32,
    #[serde(default = "default_max_idle_time")]
    pub max_idle_time: u32,
    #[serde(default = "default_stream_types")]
    pub stream_types: u32,
    #[serde(default = "default_channel_type")]
    pub channel_type: u32,
    #[serde(default)]
    pub transcoding: TranscodingConfig,
    /// Vendor code of the third-party storage provider (1 = AWS S3).
    #[serde(default = "default_storage_vendor")]
    pub storage_vendor: u32,
    /// Vendor code of the bucket region. This is the recording vendor's
    /// numeric code, not the AWS region string in [`StorageConfig`].
    #[serde(default)]
    pub storage_region: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            resource_expired_hour: default_resource_expired_hour(),
            max_idle_time: default_max_idle_time(),
            stream_types: default_stream_types(),
            channel_type: default_channel_type(),
            transcoding: TranscodingConfig::default(),
            storage_vendor: default_storage_vendor(),
            storage_region: 0,
        }
    }
}

fn default_mode() -> String {
    "mix".to_string()
}

fn default_resource_expired_hour() -> u32 {
    24
}

fn default_max_idle_time() -> u32 {
    30
}

fn default_stream_types() -> u32 {
    2
}

fn default_channel_type() -> u32 {
    1
}

fn default_storage_vendor() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscodingConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Output bitrate in Kbps.
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_mixed_video_layout")]
    pub mixed_video_layout: u32,
    #[serde(default = "default_background_color")]
    pub background_color: String,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            bitrate: default_bitrate(),
            fps: default_fps(),
            mixed_video_layout: default_mixed_video_layout(),
            background_color: default_background_color(),
        }
    }
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_bitrate() -> u32 {
    2260
}

fn default_fps() -> u32 {
    15
}

fn default_mixed_video_layout() -> u32 {
    1
}

fn default_background_color() -> String {
    "#000000".to_string()
}

// ---------------------------------------------------------------------------
// Storage (S3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    /// AWS region of the bucket (e.g. `us-east-1`).
    pub region: String,
    /// Name of the environment variable that holds the bucket access key.
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,
    /// Name of the environment variable that holds the bucket secret key.
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
    /// TTL (seconds) for pre-signed download URLs.
    #[serde(default = "default_presigned_url_ttl")]
    pub presigned_url_ttl: u64,
    /// Object key suffix that marks a playable recording.
    #[serde(default = "default_playlist_suffix")]
    pub playlist_suffix: String,
    /// Custom S3 endpoint (MinIO, localstack).  Enables path-style addressing.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_access_key_env() -> String {
    "BUCKET_ACCESS_KEY".to_string()
}

fn default_secret_key_env() -> String {
    "BUCKET_ACCESS_SECRET".to_string()
}

fn default_presigned_url_ttl() -> u64 {
    3600
}

fn default_playlist_suffix() -> String {
    "m3u8".to_string()
}

/// Longest expiry S3 accepts for a SigV4 presigned URL (7 days).
const MAX_PRESIGNED_URL_TTL: u64 = 604_800;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Token validity in seconds from issue time.
    #[serde(default = "default_token_expire")]
    pub expire_secs: u32,
    /// Validity of each granted privilege in seconds from issue time.
    #[serde(default = "default_token_expire")]
    pub privilege_expire_secs: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            expire_secs: default_token_expire(),
            privilege_expire_secs: default_token_expire(),
        }
    }
}

fn default_token_expire() -> u32 {
    86_400
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Credentials resolved from the environment at startup.
#[derive(Clone)]
pub struct Secrets {
    pub app_certificate: String,
    pub customer_id: String,
    pub customer_secret: String,
    /// Bucket key pair; `None` falls back to the default AWS credential chain.
    pub bucket_keys: Option<(String, String)>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("app_certificate", &"<redacted>")
            .field("customer_id", &self.customer_id)
            .field("customer_secret", &"<redacted>")
            .field("bucket_keys", &self.bucket_keys.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Secrets {
    /// Read every secret named in `config` from the process environment.
    pub fn from_env(config: &Config) -> Result<Self> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(config: &Config, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("environment variable {name} is not set"))
        };

        let app_certificate = required(&config.vendor.app_certificate_env)?;
        let customer_id = required(&config.vendor.customer_id_env)?;
        let customer_secret = required(&config.vendor.customer_secret_env)?;

        let bucket_keys = match (
            lookup(&config.storage.access_key_env).filter(|v| !v.is_empty()),
            lookup(&config.storage.secret_key_env).filter(|v| !v.is_empty()),
        ) {
            (Some(access), Some(secret)) => Some((access, secret)),
            _ => None,
        };

        Ok(Self {
            app_certificate,
            customer_id,
            customer_secret,
            bucket_keys,
        })
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
pub fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(!config.vendor.app_id.is_empty(), "vendor.app_id must be set");
    anyhow::ensure!(!config.storage.bucket.is_empty(), "storage.bucket must be set");
    anyhow::ensure!(
        matches!(config.recording.mode.as_str(), "mix" | "individual" | "web"),
        "recording.mode must be one of mix, individual, web"
    );
    anyhow::ensure!(config.tokens.expire_secs > 0, "tokens.expire_secs must be positive");
    anyhow::ensure!(
        (1..=MAX_PRESIGNED_URL_TTL).contains(&config.storage.presigned_url_ttl),
        "storage.presigned_url_ttl must be 1-{MAX_PRESIGNED_URL_TTL}"
    );
    let t = &config.recording.transcoding;
    anyhow::ensure!(
        t.width > 0 && t.height > 0 && t.fps > 0,
        "recording.transcoding width, height and fps must be positive"
    );
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    serde_yaml::from_str(
        r#"
vendor:
  app_id: 970ca35de60c44645bbae8a215061b33
storage:
  bucket: recordings
  region: us-east-1
"#,
    )
    .unwrap()
}
