//! Stored recording endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use super::handler::AppError;
use crate::storage;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PublicListReply {
    pub code: u16,
    pub recording_urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SignedListReply {
    pub code: u16,
    pub recordings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SignedUrlReply {
    pub code: u16,
    pub recording_url: String,
}

/// `GET /api/get/list/{channel}`
#[instrument(skip(state))]
pub async fn list_recordings(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Json<PublicListReply>, AppError> {
    let recording_urls = storage::list_recordings(
        state.store.as_ref(),
        &channel,
        &state.config.storage.playlist_suffix,
    )
    .await?;
    Ok(Json(PublicListReply {
        code: 200,
        recording_urls,
    }))
}

/// `GET /api/get/recordingUrls/{channel}`
#[instrument(skip(state))]
pub async fn list_recording_urls(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Json<SignedListReply>, AppError> {
    let recordings = storage::list_recording_urls(
        state.store.as_ref(),
        &channel,
        &state.config.storage.playlist_suffix,
    )
    .await?;
    Ok(Json(SignedListReply {
        code: 200,
        recordings,
    }))
}

/// `GET /api/get/file/{*key}`
#[instrument(skip(state))]
pub async fn protected_recording_url(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<SignedUrlReply>, AppError> {
    let recording_url = storage::protected_recording_url(state.store.as_ref(), &key).await?;
    Ok(Json(SignedUrlReply {
        code: 200,
        recording_url,
    }))
}
