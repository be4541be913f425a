//! Main axum router and shared HTTP plumbing for the recording gateway.
//!
//! Routes:
//! - `GET  /`                                  - Liveness (`OK`)
//! - `GET  /healthz`                           - Dependency health check
//! - `GET  /metrics`                           - Prometheus metrics
//! - `POST /api/start/call`                    - Acquire + start a recording
//! - `POST /api/stop/call`                     - Stop a recording
//! - `POST /api/status/call`                   - Query a recording
//! - `GET  /api/get/rtc/{channel}`             - RTC token
//! - `GET  /api/get/rtm/{uid}`                 - RTM token
//! - `GET  /api/tokens/{channel}`              - RTC + RTM tokens
//! - `GET  /api/get/list/{channel}`            - Public playlist URLs
//! - `GET  /api/get/recordingUrls/{channel}`   - Pre-signed playlist URLs
//! - `GET  /api/get/file/{*key}`               - Pre-signed URL for one object

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use super::{recording, recordings, tokens};
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors_allow_any;

    let router = Router::new()
        .route("/", get(handle_root))
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        // Recording lifecycle
        .route("/api/start/call", post(recording::start_call))
        .route("/api/stop/call", post(recording::stop_call))
        .route("/api/status/call", post(recording::call_status))
        // Tokens
        .route("/api/get/rtc/{channel}", get(tokens::rtc_token))
        .route("/api/get/rtm/{uid}", get(tokens::rtm_token))
        .route("/api/tokens/{channel}", get(tokens::tokens))
        // Stored recordings
        .route("/api/get/list/{channel}", get(recordings::list_recordings))
        .route(
            "/api/get/recordingUrls/{channel}",
            get(recordings::list_recording_urls),
        )
        .route("/api/get/file/{*key}", get(recordings::protected_recording_url))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /`
async fn handle_root() -> &'static str {
    "OK"
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        vendor_api_url: state.config.vendor.api_url.clone(),
        http_client: state.http_client.clone(),
        store: Arc::clone(&state.store),
    };
    crate::health::health_handler(State(health_state)).await
}

/// `GET /metrics`
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let buf = state.metrics.encode()?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Reply envelopes
// ---------------------------------------------------------------------------

/// `{"code": 200, "message": "successful", "data": ...}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn successful(data: T) -> Json<Self> {
        Json(Self {
            code: StatusCode::OK.as_u16(),
            message: "successful",
            data: Some(data),
        })
    }
}

/// Unwrap a JSON body, turning a rejection into [`AppError::InvalidJson`].
pub fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidJson(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type.
///
/// Every failure is answered with `422 Unprocessable Entity` and a
/// `{"msg", "err"}` body, which is what existing clients of the gateway
/// parse.
#[derive(Debug)]
pub enum AppError {
    /// The request body was not valid JSON for the endpoint.
    InvalidJson(String),
    /// The body parsed but a field value is unusable.
    InvalidRequest(String),
    /// A vendor, storage or signing call failed.
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    msg: serde_json::Value,
    err: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self {
            AppError::InvalidJson(err) => {
                warn!(error = %err, "rejected request body");
                ErrorBody {
                    msg: "invalid json".into(),
                    err,
                }
            }
            AppError::InvalidRequest(err) => {
                warn!(error = %err, "rejected request");
                ErrorBody {
                    msg: "invalid request".into(),
                    err,
                }
            }
            AppError::Internal(err) => {
                error!(error = %format!("{err:#}"), "request failed");
                ErrorBody {
                    msg: StatusCode::INTERNAL_SERVER_ERROR.as_u16().into(),
                    err: format!("{err:#}"),
                }
            }
        };
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::test_config;
    use crate::metrics::MetricsRegistry;
    use crate::recording::tests::{test_issuer, FakeRecordingApi};
    use crate::storage::tests::FakeStore;

    pub(crate) fn test_state(api: FakeRecordingApi, store: FakeStore) -> Arc<AppState> {
        Arc::new(AppState {
            config: Arc::new(test_config()),
            recording: Arc::new(api),
            store: Arc::new(store),
            tokens: test_issuer(),
            metrics: MetricsRegistry::new(),
            http_client: reqwest::Client::new(),
        })
    }

    /// Send one request through the router and decode the reply.
    pub(crate) async fn send(
        state: Arc<AppState>,
        request: Request<Body>,
    ) -> (StatusCode, Value) {
        let response = create_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body).into_owned())
        });
        (status, json)
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub(crate) fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_says_ok() {
        let state = test_state(FakeRecordingApi::default(), FakeStore::default());
        let (status, body) = send(state, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("OK".to_string()));
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_registry() {
        let state = test_state(FakeRecordingApi::default(), FakeStore::default());
        let (status, body) = send(state, get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_str().unwrap().contains("# EOF"));
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let state = test_state(FakeRecordingApi::default(), FakeStore::default());
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/start/call")
            .header(header::ORIGIN, "https://app.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn internal_error_body_shape() {
        let response = AppError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn envelope_omits_missing_data() {
        let envelope: Envelope<()> = Envelope {
            code: 200,
            message: "successful",
            data: None,
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            serde_json::json!({"code": 200, "message": "successful"})
        );
    }
}
