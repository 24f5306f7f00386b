mod authority;
mod broadcast;
mod config;
mod error;
mod routes;

use std::process::ExitCode;
use std::sync::Arc;

use reconcile::storage::DatasetFile;

use crate::authority::Authority;
use crate::config::Config;
use crate::routes::{AppState, router};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let authority = match Authority::open(
        DatasetFile::new(&config.data_file),
        config.broadcast_capacity,
    ) {
        Ok(authority) => Arc::new(authority),
        Err(e) => {
            log::error!("Refusing to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    let app = router(AppState {
        authority,
        keepalive: config.keepalive,
    });

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind {}: {e}", config.addr);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Listening on {}", config.addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        log::error!("Server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
