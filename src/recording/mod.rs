//! Cloud recording backend abstraction.
//!
//! Provides the [`RecordingApi`] trait over the vendor's acquire / start /
//! stop / query REST calls, and [`start_recording`], which chains credential
//! generation, acquire and start for a channel.

pub mod agora;
pub mod types;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::token::TokenIssuer;

use self::types::QueryResponse;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by the vendor itself (as opposed to transport errors).
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("{operation} response has no `{field}`")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A recording session started on behalf of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recorder {
    pub rid: String,
    pub sid: String,
    /// RTC token the recording bot joined with.
    pub token: String,
    pub channel: String,
    pub uid: u32,
}

/// Arguments of the start call.
#[derive(Debug, Clone)]
pub struct StartParams<'a> {
    pub channel: &'a str,
    pub uid: u32,
    pub token: &'a str,
    pub rid: &'a str,
    /// Unix seconds, used as the second storage directory segment.
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the vendor's cloud recording lifecycle endpoints.
#[async_trait::async_trait]
pub trait RecordingApi: Send + Sync {
    /// Fail before any vendor resource is reserved when a recording could
    /// not be started anyway.
    fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Reserve a recording resource for `channel`.  Returns the resource id.
    async fn acquire(&self, channel: &str, uid: u32) -> Result<String>;

    /// Start recording on an acquired resource.  Returns the session id.
    async fn start(&self, params: &StartParams<'_>) -> Result<String>;

    /// Stop a session.  Returns the vendor reply unchanged.
    async fn stop(&self, channel: &str, uid: u32, rid: &str, sid: &str)
        -> Result<serde_json::Value>;

    /// Query the state of a running session.
    async fn query(&self, rid: &str, sid: &str) -> Result<QueryResponse>;
}

// ---------------------------------------------------------------------------
// Acquire → Start
// ---------------------------------------------------------------------------

/// Generate recorder credentials, acquire a resource and start recording.
///
/// The calls run strictly in sequence.  A failed start leaves the acquired
/// resource to expire on the vendor side.
#[instrument(skip(api, tokens), fields(%channel))]
pub async fn start_recording(
    api: &dyn RecordingApi,
    tokens: &TokenIssuer,
    channel: &str,
) -> Result<Recorder> {
    api.ensure_ready()?;

    let creds = tokens
        .user_credentials(channel)
        .context("failed to generate recorder credentials")?;

    let rid = api.acquire(channel, creds.uid).await?;

    let sid = api
        .start(&StartParams {
            channel,
            uid: creds.uid,
            token: &creds.rtc,
            rid: &rid,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await?;

    info!(%rid, %sid, uid = creds.uid, "recording started");
    Ok(Recorder {
        rid,
        sid,
        token: creds.rtc,
        channel: channel.to_string(),
        uid: creds.uid,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::TokenConfig;
    use crate::token::access_token::tests::{APP_CERT, APP_ID};

    /// In-memory [`RecordingApi`] that records every call it receives.
    #[derive(Default)]
    pub(crate) struct FakeRecordingApi {
        pub calls: Mutex<Vec<String>>,
        pub fail_acquire: bool,
        pub fail_start: bool,
        pub not_ready: bool,
        pub query_reply: QueryResponse,
    }

    #[async_trait::async_trait]
    impl RecordingApi for FakeRecordingApi {
        fn ensure_ready(&self) -> Result<()> {
            anyhow::ensure!(!self.not_ready, "bucket access keys are required to start a recording");
            Ok(())
        }

        async fn acquire(&self, channel: &str, uid: u32) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("acquire {channel} {uid}"));
            if self.fail_acquire {
                return Err(VendorError::Status {
                    operation: "acquire",
                    status: 401,
                    body: "invalid authorization header".to_string(),
                }
                .into());
            }
            Ok("rid-1".to_string())
        }

        async fn start(&self, params: &StartParams<'_>) -> Result<String> {
            self.calls.lock().unwrap().push(format!(
                "start {} {} {}",
                params.channel, params.uid, params.rid
            ));
            if self.fail_start {
                return Err(VendorError::MissingField {
                    operation: "start",
                    field: "sid",
                }
                .into());
            }
            Ok("sid-1".to_string())
        }

        async fn stop(
            &self,
            channel: &str,
            uid: u32,
            rid: &str,
            sid: &str,
        ) -> Result<serde_json::Value> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("stop {channel} {uid} {rid} {sid}"));
            Ok(serde_json::json!({"resourceId": rid, "sid": sid}))
        }

        async fn query(&self, rid: &str, sid: &str) -> Result<QueryResponse> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("query {rid} {sid}"));
            Ok(self.query_reply.clone())
        }
    }

    pub(crate) fn test_issuer() -> TokenIssuer {
        TokenIssuer::new(APP_ID, APP_CERT, &TokenConfig::default())
    }

    #[tokio::test]
    async fn start_recording_chains_acquire_then_start() {
        let api = FakeRecordingApi::default();
        let recorder = start_recording(&api, &test_issuer(), "room").await.unwrap();

        assert_eq!(recorder.rid, "rid-1");
        assert_eq!(recorder.sid, "sid-1");
        assert_eq!(recorder.channel, "room");
        assert!(recorder.token.starts_with("007"));

        let calls = api.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                format!("acquire room {}", recorder.uid),
                format!("start room {} rid-1", recorder.uid),
            ]
        );
    }

    #[tokio::test]
    async fn acquire_failure_skips_start() {
        let api = FakeRecordingApi {
            fail_acquire: true,
            ..Default::default()
        };
        let err = start_recording(&api, &test_issuer(), "room")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 401"));
        assert_eq!(api.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unready_backend_makes_no_vendor_call() {
        let api = FakeRecordingApi {
            not_ready: true,
            ..Default::default()
        };
        let err = start_recording(&api, &test_issuer(), "room")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bucket access keys"));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_failure_is_not_compensated() {
        let api = FakeRecordingApi {
            fail_start: true,
            ..Default::default()
        };
        let err = start_recording(&api, &test_issuer(), "room")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no `sid`"));
        // acquire + start, and nothing afterwards (no stop / release).
        assert_eq!(api.calls.lock().unwrap().len(), 2);
    }
}
