mod config;
mod health;
mod http;
mod metrics;
mod recording;
mod storage;
mod token;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LogFormat, Secrets};
use crate::metrics::MetricsRegistry;
use crate::recording::agora::AgoraRecordingApi;
use crate::recording::RecordingApi;
use crate::storage::s3::S3RecordingStore;
use crate::storage::RecordingStore;
use crate::token::TokenIssuer;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "recgate", about = "Cloud recording and token gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/recgate/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Vendor cloud recording API.
    pub recording: Arc<dyn RecordingApi>,
    /// Bucket the vendor uploads recordings into.
    pub store: Arc<dyn RecordingStore>,
    pub tokens: TokenIssuer,
    pub metrics: MetricsRegistry,
    pub http_client: reqwest::Client,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState) -> Result<()> {
    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .listen
        .parse()
        .context("invalid server.listen address")?;

    let app = http::handler::create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = Arc::new(config::load_config(&cli.config)?);

    // ---- Tracing ----
    init_tracing(config.logging.format);
    tracing::info!(config_path = %cli.config, "starting recgate");

    // ---- Secrets ----
    let secrets = Secrets::from_env(&config)?;
    if secrets.bucket_keys.is_none() {
        tracing::warn!("bucket access keys not set; recordings cannot be started");
    }

    // ---- Infrastructure clients ----
    let http_client = reqwest::Client::builder()
        .user_agent("recgate/0.1")
        .timeout(Duration::from_secs(config.vendor.request_timeout_secs))
        .build()
        .context("failed to build reqwest client")?;

    let s3 = storage::s3::build_client(&config.storage, &secrets).await;
    tracing::info!(
        bucket = %config.storage.bucket,
        region = %config.storage.region,
        "S3 client initialised"
    );

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- Backends ----
    let recording: Arc<dyn RecordingApi> = Arc::new(
        AgoraRecordingApi::new(http_client.clone(), &config, &secrets).with_metrics(metrics.clone()),
    );
    let store: Arc<dyn RecordingStore> =
        Arc::new(S3RecordingStore::new(s3, &config.storage).with_metrics(metrics.clone()));
    let tokens = TokenIssuer::new(&config.vendor.app_id, &secrets.app_certificate, &config.tokens)
        .with_metrics(metrics.clone());

    // ---- App state ----
    let state = AppState {
        config: Arc::clone(&config),
        recording,
        store,
        tokens,
        metrics,
        http_client,
    };

    run_http_server(state).await?;

    tracing::info!("recgate shut down cleanly");
    Ok(())
}
