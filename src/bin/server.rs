//! meterlog HTTP server
//!
//! Serves the meter and reading API, stores uploaded photos and pushes
//! unsynced readings to Google Sheets on a timer.
//!
//! # Configuration
//!
//! Read from `~/.config/meterlog/config.yaml` (or the path in `METERLOG_CONFIG`),
//! with `METERLOG_*` environment variables taking precedence:
//!
//! ```yaml
//! database_path: meterlog.db
//! upload_dir: uploads
//! port: 3001
//! cors_origin: http://localhost:3000
//! sync:
//!   interval_minutes: 60
//!   service_account_path: service-account.json
//!   spreadsheet_id: "1AbC..."
//!   sheet_name: Avlesninger
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meterlog::config::Config;
use meterlog::db::init_db;
use meterlog::server::{build_router, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meterlog=info,meterlog_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("METERLOG_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path)?;

    if let Some(path) = &config.config_file {
        tracing::info!("Config file: {}", path.display());
    }
    tracing::info!("Database: {}", config.database_path.value.display());
    tracing::info!("Upload directory: {}", config.upload_dir.value.display());

    std::fs::create_dir_all(&config.upload_dir.value)?;
    let pool = init_db(&config.database_path.value).await?;

    let state = AppState::from_config(pool, &config);
    let scheduler = state.scheduler.clone();
    if !state.engine().is_configured() {
        tracing::info!("Google Sheets not configured, scheduled cycles will be skipped");
    }
    scheduler.start(config.sync.interval_minutes.value);

    let app = build_router(
        state,
        &config.cors_origin.value,
        config.static_dir.value.as_deref(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port.value));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Waiting for in-flight sync to finish");
    scheduler.shutdown().await;
    tracing::info!("Server has shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
