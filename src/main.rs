//! autoheal - Self-Healing Control Loop
//!
//! Polls health probes, drives failing components through staged automated
//! recovery, alerts operators and escalates what automation cannot fix.
//!
//! # Usage
//!
//! ```bash
//! # Defaults, or ./autoheal.toml when present
//! cargo run --release
//!
//! # Explicit config, JSON logs, no HTTP API
//! ./autoheal --config /etc/autoheal/autoheal.toml --log-format json --no-api
//! ```
//!
//! # Environment Variables
//!
//! - `AUTOHEAL_CONFIG`: Path to the TOML config (when `--config` is not given)
//! - `AUTOHEAL_CORS_ORIGINS`: Comma-separated origins allowed to call the API
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use autoheal::api::create_app;
use autoheal::control_plane::{ControlPlane, TaskName};
use autoheal::AutohealConfig;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "autoheal")]
#[command(about = "Self-healing failure detection and recovery control loop")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (overrides AUTOHEAL_CONFIG and ./autoheal.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the API bind address (default: "0.0.0.0:8090")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Override the data directory
    #[arg(long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Run the control loop without the HTTP API
    #[arg(long)]
    no_api: bool,
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Serve the control API until `cancel_token` fires.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Serving control API");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Draining API connections");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Control API stopped");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!(error = %e, "[HttpServer] Control API failed");
                Err(anyhow::anyhow!("control API server error: {}", e))
            }
        }
    });
}

/// Watch the binary's own tasks until Ctrl-C. The control plane supervises
/// its loops itself; a failed API task takes the whole process down.
async fn supervise_api(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    info!(tasks = task_set.len(), "🔒 Supervisor: control loop up, watching API task");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown requested, stopping API");
                break;
            }
            result = task_set.join_next(), if !task_set.is_empty() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!(task = %task_name, "🔒 Supervisor: Task exited");
                    }
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "🔒 Supervisor: Task failed, shutting down control plane");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "🔒 Supervisor: Task panicked, shutting down control plane");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("API task panicked: {}", e));
                    }
                    None => {}
                }
            }
        }
    }

    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!(task = %task_name, "🔒 Supervisor: Task drained");
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_format);

    let mut config = match &args.config {
        Some(path) => AutohealConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AutohealConfig::load(),
    };
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }
    let server_addr = config.server.addr.clone();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  autoheal - Self-Healing Control Loop");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        probes = config.probes.len(),
        actions = config.actions.len(),
        data_dir = %config.storage.data_dir.display(),
        "Configuration loaded"
    );

    let plane = Arc::new(
        ControlPlane::open(config)
            .await
            .context("Failed to initialize control plane")?,
    );

    let listener = if args.no_api {
        info!("🌐 HTTP API: disabled");
        None
    } else {
        let listener = tokio::net::TcpListener::bind(&server_addr)
            .await
            .with_context(|| format!("Failed to bind API address {}", server_addr))?;
        info!("🌐 HTTP API: http://{}/api/v1", server_addr);
        Some(listener)
    };

    plane.start().await.context("Failed to start control plane")?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    if let Some(listener) = listener {
        spawn_http_server(&mut task_set, listener, create_app(Arc::clone(&plane)), cancel_token.clone());
    }

    let result = supervise_api(&mut task_set, cancel_token).await;
    plane.stop().await;

    info!("✓ autoheal shutdown complete");
    result
}
