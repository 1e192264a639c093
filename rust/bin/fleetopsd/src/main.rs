//! `fleetopsd`: the fleet equipment ledger server.
//!
//! Usage:
//!   fleetopsd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/fleetops/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod config;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fleetops_core::Module;
use tracing::info;

use config::ServerConfig;

/// Fleet equipment server.
#[derive(Parser, Debug)]
#[command(name = "fleetopsd", about = "Fleet equipment usage and lifecycle server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides the config file, default 0.0.0.0:8080).
    #[arg(long = "listen")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    let data_dir = PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = fleetops_core::ServiceConfig {
        sqlite_path: server_config.storage.sqlite_path.as_ref().map(PathBuf::from),
        ..fleetops_core::ServiceConfig::in_dir(&data_dir)
    }
    .listen_on(cli.listen.or_else(|| server_config.listen.clone()));

    let sql: Arc<dyn fleetops_sql::SQLStore> = Arc::new(
        fleetops_sql::SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    let equipment = equipment::EquipmentModule::with_config(sql, server_config.engine.clone())?;
    info!(
        "Equipment module initialized (due-soon threshold {})",
        server_config.engine.due_soon_threshold
    );

    let app = routes::build_router(vec![(equipment.name(), equipment.routes())]);

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("fleetopsd listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
