//! Execution Core Binary
//!
//! Starts the HTTP API and the background scheduler.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin execution-core
//! ```
//!
//! # Environment Variables
//!
//! - `EXECUTION_CORE_CONFIG`: Path to the YAML config (default: `config.yaml`)
//! - `RUST_LOG`: Log filter (default: `observability.log_filter` from the config)
//!
//! Any `${VAR}` or `${VAR:-default}` inside the config file is read from the
//! environment, which is seeded from a `.env` file when one is found.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use execution_core::config::{
    CONFIG_PATH_ENV, Config, ConfigError, config_path, load_config, startup_warnings,
};
use execution_core::infrastructure::config::Container;
use execution_core::infrastructure::http::{AppState, create_router};
use execution_core::observability::{LoggingConfig, MetricsConfig, init_logging, init_metrics};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long background tasks get to finish after shutdown is requested.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = read_config()?;
    init_logging(&LoggingConfig {
        json: config.observability.json_logs,
        filter: config.observability.log_filter.clone(),
    })
    .context("failed to initialize logging")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting execution core");
    log_config(&config);

    if config.observability.metrics_enabled {
        let metrics_addr: SocketAddr =
            format!("{}:{}", config.server.bind_address, config.server.metrics_port)
                .parse()
                .context("invalid metrics address")?;
        init_metrics(&MetricsConfig::with_addr(metrics_addr))
            .context("failed to start metrics exporter")?;
    }

    let (container, escalations) = Container::from_config(config);
    let container = Arc::new(container);

    let shutdown_token = CancellationToken::new();
    let scheduler = container.scheduler(shutdown_token.clone());
    let background = scheduler.start(escalations);

    let http_handle = start_http_server(&container, shutdown_token.clone()).await?;

    tracing::info!("Execution core ready");

    shutdown_signal().await;
    shutdown_token.cancel();
    await_shutdown(http_handle, background).await;

    tracing::info!("Execution core stopped");
    Ok(())
}

/// Load the config file. When no path was named and the default file does
/// not exist, run on defaults (paper mode).
fn read_config() -> anyhow::Result<Config> {
    let explicit = std::env::var(CONFIG_PATH_ENV).is_ok();
    let path = config_path(None);

    match load_config(Some(&path)) {
        Ok(config) => Ok(config),
        Err(ConfigError::ReadError { .. }) if !explicit && !Path::new(&path).exists() => {
            eprintln!("{path} not found, using default configuration");
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("failed to load configuration from {path}")),
    }
}

/// Log the effective configuration and any warnings about it.
fn log_config(config: &Config) {
    tracing::info!(
        mode = ?config.execution.mode,
        http_port = config.server.http_port,
        metrics_port = config.server.metrics_port,
        failure_mode = %config.stops.failure_mode,
        live_users = config.accounts.live_users.len(),
        "Configuration loaded"
    );
    for warning in startup_warnings(config) {
        tracing::warn!("{warning}");
    }
}

/// Start the HTTP server; it stops when the token is cancelled.
async fn start_http_server(
    container: &Arc<Container>,
    shutdown: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let app = create_router(AppState::new(Arc::clone(container)));

    let http_addr: SocketAddr = container
        .config
        .server
        .http_addr()
        .parse()
        .context("invalid HTTP address")?;

    tracing::info!(%http_addr, "HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /api/v1/guard");
    tracing::info!("  POST /api/v1/orders");
    tracing::info!("  GET  /api/v1/orders/{{id}}");
    tracing::info!("  POST /api/v1/trades/{{id}}/exit");
    tracing::info!("  POST /api/v1/panic");
    tracing::info!("  POST /api/v1/safe-mode/clear");
    tracing::info!("  POST /api/v1/emergency/clear");
    tracing::info!("  POST /api/v1/reconcile");

    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;
    let http_server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    Ok(tokio::spawn(async move {
        if let Err(e) = http_server.await {
            tracing::error!("HTTP server error: {e}");
        }
    }))
}

/// Wait for the server and background tasks, bounded by [`SHUTDOWN_TIMEOUT`].
async fn await_shutdown(http_handle: JoinHandle<()>, background: Vec<JoinHandle<()>>) {
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    let drain = async {
        let _ = http_handle.await;
        futures::future::join_all(background).await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("Shutdown timed out, abandoning remaining tasks");
    }
}

/// Load .env from the current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; a process that cannot
/// receive termination signals should not start.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
