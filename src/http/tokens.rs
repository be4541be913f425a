//! Token endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::handler::AppError;
use crate::token::{random_uid, Role};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RtcQuery {
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct RtcTokenReply {
    pub code: u16,
    pub rtc_token: String,
    pub uid: u32,
}

#[derive(Debug, Serialize)]
pub struct RtmTokenReply {
    pub code: u16,
    pub rtm_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokensReply {
    pub code: u16,
    pub rtc_token: String,
    pub rtm_token: String,
    pub uid: u32,
}

/// `GET /api/get/rtc/{channel}`
#[instrument(skip(state, query))]
pub async fn rtc_token(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(query): Query<RtcQuery>,
) -> Result<Json<RtcTokenReply>, AppError> {
    let uid = random_uid();
    let rtc_token = state
        .tokens
        .rtc_token(&channel, uid, query.role.unwrap_or_default())?;
    Ok(Json(RtcTokenReply {
        code: 200,
        rtc_token,
        uid,
    }))
}

/// `GET /api/get/rtm/{uid}`
#[instrument(skip(state))]
pub async fn rtm_token(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<RtmTokenReply>, AppError> {
    let rtm_token = state.tokens.rtm_token(&uid)?;
    Ok(Json(RtmTokenReply {
        code: 200,
        rtm_token,
    }))
}

/// `GET /api/tokens/{channel}`
#[instrument(skip(state))]
pub async fn tokens(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
) -> Result<Json<TokensReply>, AppError> {
    let creds = state.tokens.user_credentials(&channel)?;
    Ok(Json(TokensReply {
        code: 200,
        rtc_token: creds.rtc,
        rtm_token: creds.rtm,
        uid: creds.uid,
    }))
}
