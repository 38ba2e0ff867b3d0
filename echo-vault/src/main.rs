//! echo-vault - EchoVerse voice time capsule service
//!
//! Records voice memos from the local microphone, stores them with a mood and
//! unlock date, and serves the dashboard, timeline and calendar over HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use echo_common::config::{self, EchoConfig, ROOT_ENV_VAR};
use echo_common::db::init_database;
use echo_common::events::EventBus;
use echo_common::{Clock, SystemClock};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use echo_vault::playback::AudioPlayback;
use echo_vault::recording::AudioCapture;
use echo_vault::services::{
    AuthService, BlobStore, FsBlobStore, RecordStore, SqliteAuthService, SqliteRecordStore,
    TimedAuthService, TimedBlobStore, TimedRecordStore,
};
use echo_vault::{build_router, AppState, Backends};

/// Command-line arguments for echo-vault
#[derive(Parser, Debug)]
#[command(name = "echo-vault")]
#[command(about = "EchoVerse voice time capsule service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and audio blobs
    #[arg(short, long, env = "ECHOVERSE_ROOT")]
    root_folder: Option<PathBuf>,

    /// Config file (TOML)
    #[arg(short, long, env = "ECHOVERSE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Input device name (default device when omitted)
    #[arg(long, env = "ECHOVERSE_INPUT_DEVICE")]
    input_device: Option<String>,

    /// Output device name (default device when omitted)
    #[arg(long, env = "ECHOVERSE_OUTPUT_DEVICE")]
    output_device: Option<String>,
}

#[cfg(feature = "device-audio")]
fn audio_devices(args: &Args) -> (Arc<dyn AudioCapture>, Arc<dyn AudioPlayback>) {
    use echo_vault::playback::device::CpalPlayback;
    use echo_vault::recording::device::CpalCapture;

    info!("Using system audio devices");
    (
        Arc::new(CpalCapture::new(args.input_device.clone())),
        Arc::new(CpalPlayback::new(args.output_device.clone())),
    )
}

#[cfg(not(feature = "device-audio"))]
fn audio_devices(args: &Args) -> (Arc<dyn AudioCapture>, Arc<dyn AudioPlayback>) {
    use echo_vault::playback::fake::FakePlayback;
    use echo_vault::recording::NoInputDevice;

    if args.input_device.is_some() || args.output_device.is_some() {
        warn!("Built without device-audio; device selection ignored");
    }
    warn!("Built without device-audio; recording is unavailable");
    (Arc::new(NoInputDevice), Arc::new(FakePlayback::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echo_vault=info,echo_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Log build identification immediately, before any database delay
    info!(
        "Starting EchoVerse vault (echo-vault) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let mut config = EchoConfig::load(args.config.as_deref()).context("Failed to load config")?;
    if let Some(bind) = &args.bind {
        config.bind_addr = bind.clone();
    }
    config.validate().context("Invalid configuration")?;

    let root_arg = args.root_folder.as_ref().map(|p| p.to_string_lossy().to_string());
    let root_folder = config::resolve_root_folder(root_arg.as_deref(), ROOT_ENV_VAR, Some(&config));
    info!("Root folder: {}", root_folder.display());

    let db_path = config::database_path(&root_folder);
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database ready: {}", db_path.display());

    let blobs_dir = config::blobs_path(&root_folder);
    std::fs::create_dir_all(&blobs_dir)
        .with_context(|| format!("Failed to create {}", blobs_dir.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = EventBus::new(config.event_bus_capacity);
    let timeout = Duration::from_millis(config.request_timeout_ms);

    let auth: Arc<dyn AuthService> = Arc::new(TimedAuthService::new(
        Arc::new(SqliteAuthService::new(
            pool.clone(),
            Arc::clone(&clock),
            chrono::Duration::hours(config.session_ttl_hours),
        )),
        timeout,
    ));
    let store: Arc<dyn RecordStore> = Arc::new(TimedRecordStore::new(
        Arc::new(SqliteRecordStore::new(pool.clone(), events.clone())),
        timeout,
    ));
    let blobs: Arc<dyn BlobStore> = Arc::new(TimedBlobStore::new(
        Arc::new(FsBlobStore::new(blobs_dir, &config.public_base_url())),
        timeout,
    ));
    let (capture, playback) = audio_devices(&args);

    let state = AppState::new(
        Backends {
            auth,
            store,
            blobs,
            capture,
            playback,
            clock,
            events,
        },
        &config,
    );

    let reconciler = Arc::clone(&state.reconciler).spawn();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("echo-vault listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reconciler.shutdown();
    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
