//! Demo service exercising logging, trace ids and error reporting.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use tokio::net::TcpListener;

use rmlog::config::{self, ConfigWatcher, RmlogConfig};
use rmlog::errors::{AppError, ErrorKind};
use rmlog::http::middleware;
use rmlog::http::{HandlerError, HttpError};
use rmlog::reporting::{self, Reporting};

#[derive(Parser)]
#[command(name = "rmlog-demo")]
#[command(about = "Demo HTTP service for rmlog", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Reload logging settings when the config file changes
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => RmlogConfig::default(),
    };

    let handle = rmlog::logging::init(&config.logging)?;

    if config.reporting.enabled {
        reporting::init(&config.reporting)?;
    }

    // keep the watcher alive for the whole run
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path, &config.logging);
            let watcher = watcher.run()?;
            tokio::spawn(config::apply_updates(handle, updates));
            Some(watcher)
        }
        _ => None,
    };

    let app = middleware::install(routes(), Reporting::Global);

    let listener = TcpListener::bind(cli.bind).await?;
    tracing::warn!(address = %listener.local_addr()?, "rmlog-demo listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !reporting::flush(Duration::from_secs(2)) {
        tracing::warn!("Pending error reports were not flushed");
    }
    Ok(())
}

fn routes() -> Router {
    Router::new()
        .route("/users/{id}", get(get_user))
        .route("/orders", get(list_orders))
        .route("/upstream", get(upstream))
        .route("/panic", get(panic_handler))
}

async fn get_user(Path(id): Path<String>) -> Result<Json<serde_json::Value>, HandlerError> {
    let id: u64 = id.parse().map_err(|e| {
        AppError::builder()
            .kind(ErrorKind::Validation)
            .property("id")
            .message("must be a number")
            .value(&id)
            .system_error(e)
            .build()
    })?;

    if id == 0 {
        return Err(AppError::builder()
            .kind(ErrorKind::NotFound)
            .property("id")
            .message("user not found")
            .value(id)
            .build()
            .into());
    }

    tracing::info!(user_id = id, "user fetched");
    Ok(Json(serde_json::json!({ "id": id })))
}

async fn list_orders() -> Result<Json<Vec<u64>>, HandlerError> {
    let cause = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
    Err(AppError::builder()
        .kind(ErrorKind::Database)
        .details("select orders")
        .system_error(cause)
        .build()
        .into())
}

async fn upstream() -> Result<&'static str, HandlerError> {
    Err(HttpError::new(axum::http::StatusCode::BAD_GATEWAY, "upstream unavailable").into())
}

async fn panic_handler() -> &'static str {
    panic!("demo panic")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::warn!("Shutdown signal received");
}
