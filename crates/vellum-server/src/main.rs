//! Vellum admin server.
//!
//! Wires the extension engine to SQLite persistence and exposes the
//! admin HTTP API plus the extension dispatch namespace.

mod auth;
mod config;
mod db;
mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vellum_core::extension_system::{ExtensionKind, LibraryModuleLoader};
use vellum_core::kernel::bootstrap::ApplicationConfig;
use vellum_core::Application;

use crate::config::ServerConfig;
use crate::db::{open_database, SqliteContentRepository, SqliteRegistrationStore};
use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "vellumd", about = "Vellum extension engine server", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load(cli.config.as_ref())?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    std::fs::create_dir_all(&config.data_dir)?;
    let conn = open_database(&config.database_path())?;

    let app = Arc::new(Application::new(ApplicationConfig {
        plugins_root: config.plugins_root(),
        themes_root: config.themes_root(),
        plugin_store: Arc::new(SqliteRegistrationStore::new(
            conn.clone(),
            ExtensionKind::Plugin,
        )),
        theme_store: Arc::new(SqliteRegistrationStore::new(
            conn.clone(),
            ExtensionKind::Theme,
        )),
        repository: Arc::new(SqliteContentRepository::new(conn)),
        module_loader: Arc::new(LibraryModuleLoader::new()),
    })?);
    app.start().await?;

    let state = AppState {
        app: Arc::clone(&app),
        uploads_dir: config.uploads_dir(),
        api_token: config.api_token.clone(),
    };
    let router = routes::build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
