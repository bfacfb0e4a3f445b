//! Tidepool: a streaming chat relay with durable per-session history.

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, prelude::*};
use uuid::Uuid;

mod assets;
mod backend;
mod config;
mod db;
mod error;
mod handlers;
mod metrics;
mod relay;
mod store;

use crate::backend::{ChatBackend, HttpChatBackend};
use crate::config::{BackendConfig, TidepoolConfig, load_config};
use crate::db::Database;
use crate::metrics::RelayMetrics;
use crate::store::{ConversationStore, SqliteTurnStorage};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4();
        tracing::info_span!(
            "request",
            id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

/// Shared application state passed to all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<ConversationStore>,
    pub backend: Arc<dyn ChatBackend>,
    pub metrics: Arc<RelayMetrics>,
    pub db: Arc<Database>,
    pub system_prompt: String,
}

#[derive(Parser)]
#[command(name = "tide")]
#[command(about = "Streaming chat relay with durable per-session history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.tidepool)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server in the foreground
    Serve {
        /// Port for the web server
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Enable debug logging
        #[arg(short, long)]
        debug: bool,

        /// Delete the conversation database before starting
        #[arg(long)]
        reset_db: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TidepoolConfig::new(cli.data_dir.clone())?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            debug,
            reset_db,
        } => run_server(config, port, host, debug, reset_db).await,
    }
}

async fn run_server(
    config: TidepoolConfig,
    port: Option<u16>,
    host: Option<String>,
    debug: bool,
    reset_db: bool,
) -> Result<()> {
    let directive = if debug {
        "tide=debug,tower_http=debug,info"
    } else {
        "tide=info,tower_http=info,warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting tidepool chat relay");

    if reset_db {
        print!(
            "This deletes all stored conversations in {}. Continue? [y/N] ",
            config.db_path.display()
        );
        std::io::stdout().flush().context("Failed to flush stdout")?;
        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .context("Failed to read confirmation")?;
        if answer.trim().eq_ignore_ascii_case("y") {
            config.reset_database()?;
            info!("Conversation database reset");
        } else {
            info!("Reset cancelled");
            return Ok(());
        }
    }

    let file_config = load_config(&config)?;
    let backend_config = BackendConfig::from_file(&file_config.backend)?;

    let db = Database::new(&config).await?;
    let store = Arc::new(ConversationStore::new(Arc::new(SqliteTurnStorage::new(
        db.pool.clone(),
    ))));
    let backend: Arc<dyn ChatBackend> = Arc::new(HttpChatBackend::new(backend_config.clone())?);
    let metrics = Arc::new(RelayMetrics::new());

    info!(
        "Relaying to {} ({})",
        backend_config.url,
        backend_config
            .model
            .as_deref()
            .unwrap_or("model set by endpoint"),
    );

    let state = AppState {
        store,
        backend,
        metrics,
        db: Arc::new(db),
        system_prompt: file_config.relay.system_prompt.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/api/chat", post(handlers::chat_handler))
        .route("/api/clear", post(handlers::clear_handler))
        .route("/api/health", get(handlers::health_handler))
        .route("/api/metrics", get(handlers::metrics_handler));
    // An explicit static_dir overrides the compiled-in chat page.
    let app = match &file_config.server.static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.fallback(assets::serve_asset),
    };
    let app = app
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors)
        .with_state(state);

    let host = host
        .or(file_config.server.host)
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = port.or(file_config.server.port).unwrap_or(8787);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {host}:{port}"))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual = listener.local_addr().context("Failed to read local address")?;

    info!("Tidepool listening on http://{actual}");
    info!("API endpoints:");
    info!("  POST /api/chat    - relay a message, stream the reply");
    info!("  POST /api/clear   - reset a session's history");
    info!("  GET  /api/health  - liveness and database check");
    info!("  GET  /api/metrics - relay counters");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
