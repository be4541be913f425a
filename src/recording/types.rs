//! Request and response bodies of the cloud recording REST API.

use serde::{Deserialize, Serialize};

use crate::config::{RecordingConfig, TranscodingConfig};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Envelope shared by acquire, start and stop.  The vendor expects `uid` as
/// a decimal string.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorRequest<C> {
    pub cname: String,
    pub uid: String,
    pub client_request: C,
}

impl<C> VendorRequest<C> {
    pub fn new(channel: &str, uid: u32, client_request: C) -> Self {
        Self {
            cname: channel.to_string(),
            uid: uid.to_string(),
            client_request,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireClientRequest {
    pub resource_expired_hour: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartClientRequest {
    pub token: String,
    pub recording_config: RecordingConfigBody,
    pub storage_config: StorageConfigBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfigBody {
    pub max_idle_time: u32,
    pub stream_types: u32,
    pub channel_type: u32,
    pub transcoding_config: TranscodingConfigBody,
}

impl From<&RecordingConfig> for RecordingConfigBody {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            max_idle_time: config.max_idle_time,
            stream_types: config.stream_types,
            channel_type: config.channel_type,
            transcoding_config: TranscodingConfigBody::from(&config.transcoding),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingConfigBody {
    pub height: u32,
    pub width: u32,
    pub bitrate: u32,
    pub fps: u32,
    pub mixed_video_layout: u32,
    pub background_color: String,
}

impl From<&TranscodingConfig> for TranscodingConfigBody {
    fn from(t: &TranscodingConfig) -> Self {
        Self {
            height: t.height,
            width: t.width,
            bitrate: t.bitrate,
            fps: t.fps,
            mixed_video_layout: t.mixed_video_layout,
            background_color: t.background_color.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfigBody {
    pub vendor: u32,
    pub region: u32,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Directory segments the vendor writes files under: `[channel, unix_ts]`.
    pub file_name_prefix: Vec<String>,
}

/// Stop takes an empty `clientRequest` object.
#[derive(Debug, Default, Serialize)]
pub struct StopClientRequest {}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireResponse {
    #[serde(default)]
    pub resource_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub sid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub server_response: ServerResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_list_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_list: Option<FileList>,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub slice_start_time: i64,
}

/// `fileList` is a JSON array in `json` file-list mode and a single playlist
/// path in `string` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileList {
    Entries(Vec<FileEntry>),
    Path(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub track_type: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub mixed_all_user: bool,
    #[serde(default)]
    pub is_playable: bool,
    #[serde(default)]
    pub slice_start_time: i64,
}
