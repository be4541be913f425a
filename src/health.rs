use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::storage::RecordingStore;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub vendor: CheckResult,
    pub storage: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state expected by the handler
// ---------------------------------------------------------------------------

/// Subset of `AppState` required by the health-check handler.
#[derive(Clone)]
pub struct HealthState {
    pub vendor_api_url: String,
    pub http_client: reqwest::Client,
    pub store: Arc<dyn RecordingStore>,
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

/// Upper bound for the vendor probe, independent of the client's call timeout.
const VENDOR_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Any HTTP answer from the vendor host counts as reachable; the root path
/// is not an API endpoint and usually answers 404.
async fn check_vendor(client: &reqwest::Client, api_url: &str) -> CheckResult {
    check_vendor_within(client, api_url, VENDOR_CHECK_TIMEOUT).await
}

async fn check_vendor_within(
    client: &reqwest::Client,
    api_url: &str,
    timeout: Duration,
) -> CheckResult {
    match client.head(api_url).timeout(timeout).send().await {
        Ok(resp) if resp.status().is_server_error() => {
            CheckResult::unhealthy(format!("HEAD {api_url} returned {}", resp.status()))
        }
        Ok(_) => CheckResult::healthy(),
        Err(e) => CheckResult::unhealthy(format!("HEAD {api_url} failed: {e}")),
    }
}

async fn check_storage(store: &dyn RecordingStore) -> CheckResult {
    match store.ping().await {
        Ok(()) => CheckResult::healthy(),
        Err(e) => CheckResult::unhealthy(format!("{e:#}")),
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    if checks.vendor.ok && checks.storage.ok {
        HealthStatus::Ok
    } else if !checks.vendor.ok {
        // Start / stop / status all go through the vendor.
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler.  Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (vendor, storage) = tokio::join!(
        check_vendor(&state.http_client, &state.vendor_api_url),
        check_storage(state.store.as_ref()),
    );

    let checks = HealthChecks { vendor, storage };
    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::routing::any;
    use axum::Router;

    use super::*;
    use crate::storage::tests::FakeStore;

    fn checks(vendor: bool, storage: bool) -> HealthChecks {
        let r = |ok| {
            if ok {
                CheckResult::healthy()
            } else {
                CheckResult::unhealthy("down")
            }
        };
        HealthChecks {
            vendor: r(vendor),
            storage: r(storage),
        }
    }

    #[test]
    fn aggregate_all_ok() {
        assert_eq!(aggregate_status(&checks(true, true)), HealthStatus::Ok);
    }

    #[test]
    fn aggregate_storage_down_is_degraded() {
        assert_eq!(aggregate_status(&checks(true, false)), HealthStatus::Degraded);
    }

    #[test]
    fn aggregate_vendor_down_is_unhealthy() {
        assert_eq!(aggregate_status(&checks(false, true)), HealthStatus::Unhealthy);
    }

    async fn vendor_stub(status: StatusCode) -> String {
        let app = Router::new().route("/", any(move || async move { status }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    async fn run(vendor_status: StatusCode, store: FakeStore) -> (StatusCode, serde_json::Value) {
        let state = HealthState {
            vendor_api_url: vendor_stub(vendor_status).await,
            http_client: reqwest::Client::new(),
            store: Arc::new(store),
        };
        let resp = health_handler(State(state)).await.into_response();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn healthy_when_vendor_answers_404() {
        let (status, body) = run(StatusCode::NOT_FOUND, FakeStore::default()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["checks"]["storage"].get("detail").is_none());
    }

    #[tokio::test]
    async fn storage_failure_reports_detail() {
        let store = FakeStore {
            fail: true,
            ..Default::default()
        };
        let (status, body) = run(StatusCode::OK, store).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["checks"]["storage"]["ok"], false);
        assert!(body["checks"]["storage"]["detail"]
            .as_str()
            .unwrap()
            .contains("HeadBucket"));
    }

    #[tokio::test]
    async fn slow_vendor_check_times_out() {
        let app = Router::new().route(
            "/",
            any(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();
        let started = std::time::Instant::now();
        let result =
            check_vendor_within(&client, &format!("http://{addr}/"), Duration::from_millis(200))
                .await;
        assert!(!result.ok);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn vendor_server_error_is_unhealthy() {
        let (status, body) = run(StatusCode::BAD_GATEWAY, FakeStore::default()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }
}
