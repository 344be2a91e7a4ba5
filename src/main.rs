use anyhow::{Context, Result};
use call_recorder::{create_router, AppState, Config, FsObjectStore, RecordingManager};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "call-recorder")]
#[command(about = "Record telephony calls and upload them to object storage")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/call-recorder")]
    config: String,

    /// Override the HTTP bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recordings stored under {}", cfg.storage.root_dir);

    let store = FsObjectStore::new(&cfg.storage.root_dir)?;
    let manager = RecordingManager::new(cfg.recording.clone(), Arc::new(store));
    let app = create_router(AppState::new(manager.clone()));

    let addr = cfg.http_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Drain: finalize and upload whatever is still recording
    let stopped = manager.stop_all_recordings().await;
    info!("Shutdown complete, {} recording(s) drained", stopped);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
