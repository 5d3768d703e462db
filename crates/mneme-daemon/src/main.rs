//! mneme daemon: wraps the memory engine with a minimal localhost health
//! surface and runs the scheduled consolidation jobs in the background.
//!
//! The MCP/tool-calling transport that actually serves `remember`/`recall`
//! to an AI assistant is a separate collaborator; this binary owns the
//! engine's lifecycle (startup integrity, scheduler, graceful shutdown) and
//! the `/health`, `/status`, `/flush` surface described in the engine's
//! external-interfaces contract.

mod status;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use mneme_core::scheduler::Scheduler;
use mneme_core::{MemoryConfig, Storage};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mneme-daemon", version, about = "Background daemon for the mneme memory engine")]
struct Args {
    /// Custom data directory (defaults to ~/.claudia/memory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Optional path to a config.toml; defaults to config.toml beside the database
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port for the localhost health/status/flush surface
    #[arg(long, default_value_t = 3848)]
    port: u16,
}

struct AppState {
    storage: Arc<Storage>,
    config: Arc<MemoryConfig>,
    scheduler: Arc<Mutex<Scheduler>>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(false)
        .init();

    info!("mneme-daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let storage = match Storage::new(args.data_dir.clone()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("failed to initialize storage: {e}");
            std::process::exit(1);
        }
    };
    info!(path = %storage.path().display(), "storage initialized");

    let config = Arc::new(MemoryConfig::load(args.config.as_deref()));

    let mut scheduler = Scheduler::new(Arc::clone(&storage), Arc::clone(&config));
    scheduler.start();
    info!(jobs = ?scheduler.job_names(), "scheduler started");
    let scheduler = Arc::new(Mutex::new(scheduler));

    let state = Arc::new(AppState { storage: Arc::clone(&storage), config: Arc::clone(&config), scheduler: Arc::clone(&scheduler) });

    let app = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/flush", post(status::flush))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    info!(%addr, "health surface listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        error!("server error: {e}");
    }

    info!("shutting down");
    let mut scheduler = scheduler.lock().await;
    if let Err(e) = mneme_core::health::shutdown(&storage, &mut scheduler) {
        error!("shutdown sequence failed: {e}");
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
