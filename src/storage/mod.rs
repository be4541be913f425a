//! Recording artifact storage.
//!
//! The recording vendor uploads files to the bucket under
//! `{channel}/{unix_ts}/...`.  This module lists the playable playlists for a
//! channel and hands out either public or pre-signed URLs for them.

pub mod s3;

use anyhow::Result;
use tracing::debug;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Read-only view of the recording bucket.
#[async_trait::async_trait]
pub trait RecordingStore: Send + Sync {
    /// All object keys under `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// A time-limited GET URL for `key`.
    async fn presigned_url(&self, key: &str) -> Result<String>;

    /// The unsigned object URL for `key`.
    fn public_url(&self, key: &str) -> String;

    /// Cheap reachability check used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Keys under `{channel}/` that end with `suffix`.
async fn playlist_keys(store: &dyn RecordingStore, channel: &str, suffix: &str) -> Result<Vec<String>> {
    let prefix = format!("{channel}/");
    let keys = store.list_keys(&prefix).await?;
    let total = keys.len();
    let playlists: Vec<String> = keys
        .into_iter()
        .filter(|k| k.len() > suffix.len() && k.ends_with(suffix))
        .collect();
    debug!(%channel, total, playlists = playlists.len(), "filtered recording keys");
    Ok(playlists)
}

/// Public URLs of every playlist recorded for `channel`.
pub async fn list_recordings(
    store: &dyn RecordingStore,
    channel: &str,
    suffix: &str,
) -> Result<Vec<String>> {
    let keys = playlist_keys(store, channel, suffix).await?;
    Ok(keys.iter().map(|k| store.public_url(k)).collect())
}

/// Pre-signed URLs of every playlist recorded for `channel`.
pub async fn list_recording_urls(
    store: &dyn RecordingStore,
    channel: &str,
    suffix: &str,
) -> Result<Vec<String>> {
    let keys = playlist_keys(store, channel, suffix).await?;
    let mut urls = Vec::with_capacity(keys.len());
    for key in &keys {
        urls.push(store.presigned_url(key).await?);
    }
    Ok(urls)
}

/// Pre-signed URL for one object key.
pub async fn protected_recording_url(store: &dyn RecordingStore, key: &str) -> Result<String> {
    let key = key.trim_start_matches('/');
    anyhow::ensure!(!key.is_empty(), "recording key must not be empty");
    store.presigned_url(key).await
}
