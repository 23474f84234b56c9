//! NexDerm Classification Server
//!
//! HTTP API server exposing the skin lesion classifier. The model
//! checkpoint is loaded lazily on the first classification request unless
//! `--preload` forces it at startup.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::state::{AppState, ServerConfig};

/// NexDerm Classification Server
#[derive(Parser, Debug)]
#[command(name = "nexderm-server")]
#[command(version)]
#[command(about = "HTTP API server for skin lesion classification")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Path to the checkpoint artifact to serve
    #[arg(long, env = "NEXDERM_CHECKPOINT", default_value = "checkpoints/best.ckpt")]
    checkpoint: PathBuf,

    /// Input image size the checkpoint was trained with
    #[arg(long, env = "NEXDERM_IMAGE_SIZE", default_value = "384")]
    image_size: usize,

    /// Load the checkpoint at startup instead of on the first request
    #[arg(long, default_value = "false")]
    preload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = ServerConfig {
        checkpoint_path: cli.checkpoint,
        image_size: cli.image_size,
    };

    info!("NexDerm Server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Checkpoint: {:?}", config.checkpoint_path);
    info!("  Image size: {}", config.image_size);

    let state = Arc::new(AppState::new(config));

    if cli.preload {
        match state.service.warm_up() {
            Ok(()) => info!("Checkpoint preloaded"),
            Err(e) => warn!("Preload failed, will retry on first request: {}", e),
        }
    } else if !state.config.checkpoint_path.exists() {
        warn!(
            "Checkpoint not found at {:?}. Classification requests will fail \
            until it appears.",
            state.config.checkpoint_path
        );
    }

    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Classification
        .route("/api/v1/classify", post(routes::classify::classify))
        .route("/api/v1/classify", get(routes::classify::classify_usage))
        // Users (dummy)
        .route("/api/v1/users", get(routes::users::list_users))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
