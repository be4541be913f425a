//! Recording lifecycle endpoints.

use std::sync::Arc;

use axum::extract::{rejection::JsonRejection, State};
use axum::Json;
use serde::Deserialize;
use tracing::{info, instrument};

use super::handler::{parse_body, AppError, Envelope};
use crate::recording::types::QueryResponse;
use crate::recording::{self as rec, Recorder};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartCall {
    pub channel: String,
}

#[derive(Debug, Deserialize)]
pub struct StopCall {
    pub channel: String,
    pub uid: u32,
    pub rid: String,
    pub sid: String,
}

#[derive(Debug, Deserialize)]
pub struct CallStatus {
    pub rid: String,
    pub sid: String,
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidRequest(format!("`{field}` must not be empty")));
    }
    Ok(())
}

/// `POST /api/start/call`
#[instrument(skip_all)]
pub async fn start_call(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartCall>, JsonRejection>,
) -> Result<Json<Envelope<Recorder>>, AppError> {
    let body = parse_body(payload)?;
    require("channel", &body.channel)?;

    let recorder =
        rec::start_recording(state.recording.as_ref(), &state.tokens, &body.channel).await?;
    Ok(Envelope::successful(recorder))
}

/// `POST /api/stop/call`
#[instrument(skip_all)]
pub async fn stop_call(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StopCall>, JsonRejection>,
) -> Result<Json<Envelope<serde_json::Value>>, AppError> {
    let body = parse_body(payload)?;
    require("channel", &body.channel)?;
    require("rid", &body.rid)?;
    require("sid", &body.sid)?;

    let reply = state
        .recording
        .stop(&body.channel, body.uid, &body.rid, &body.sid)
        .await?;
    info!(channel = %body.channel, rid = %body.rid, sid = %body.sid, "recording stopped");
    Ok(Envelope::successful(reply))
}

/// `POST /api/status/call`
#[instrument(skip_all)]
pub async fn call_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CallStatus>, JsonRejection>,
) -> Result<Json<Envelope<QueryResponse>>, AppError> {
    let body = parse_body(payload)?;
    require("rid", &body.rid)?;
    require("sid", &body.sid)?;

    let status = state.recording.query(&body.rid, &body.sid).await?;
    Ok(Envelope::successful(status))
}
