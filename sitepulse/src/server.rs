//! sitepulse-server - ingestion endpoint for sitepulse collectors
//!
//! Accepts batches on `POST /api/analytics` and answers summary and session
//! queries on `GET /api/analytics`.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/sitepulse/batches.db (~/.local/share/sitepulse/batches.db)
//! - Config: $XDG_CONFIG_HOME/sitepulse/config.toml (~/.config/sitepulse/config.toml)
//! - Logs: $XDG_STATE_HOME/sitepulse/sitepulse.log

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sitepulse_core::config::StorageKind;
use sitepulse_core::db::SqliteStore;
use sitepulse_core::ingest::{BatchStore, MemoryStore};
use sitepulse_core::server::{run_server, AppState};
use sitepulse_core::Config;

#[derive(Parser)]
#[command(name = "sitepulse-server")]
#[command(about = "Run the sitepulse ingestion endpoint")]
#[command(version)]
struct Args {
    /// Address to listen on (default: from config, else 127.0.0.1:8080)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Storage backend: memory or sqlite (default: from config)
    #[arg(short, long)]
    storage: Option<StorageKind>,

    /// SQLite database path (implies --storage sqlite)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log at debug level and mirror logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn open_store(kind: StorageKind, config: &Config) -> Result<Arc<dyn BatchStore>> {
    match kind {
        StorageKind::Memory => {
            tracing::info!("Using in-memory batch store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageKind::Sqlite => {
            let path = config.server.database_path();
            let store = SqliteStore::open(&path)
                .with_context(|| format!("failed to open database at {}", path.display()))?;
            store.migrate().context("failed to run database migrations")?;
            tracing::info!(path = %path.display(), "Using SQLite batch store");
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let mut config = Config::load().context("failed to load configuration")?;

    if args.verbose {
        config.logging.level = "debug".to_string();
        config.logging.stderr = true;
    }
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(database) = args.database {
        config.server.database_path = Some(database);
        config.server.storage = StorageKind::Sqlite;
    }
    if let Some(storage) = args.storage {
        config.server.storage = storage;
    }

    let _log_guard =
        sitepulse_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let store = open_store(config.server.storage, &config)?;

    println!("sitepulse-server listening on http://{}", config.server.bind_addr);

    run_server(AppState::new(store), config.server.bind_addr)
        .await
        .context("ingestion server failed")?;

    println!("sitepulse-server stopped");
    Ok(())
}
