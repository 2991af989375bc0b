//! sitepulse-audit - Website Audit Service
//!
//! Runs the audit pipeline behind an HTTP REST + SSE API: five
//! concurrent analysis stages, an AI insight pass, composite scoring,
//! and a per-stage execution log.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitepulse_common::config::{database_path, ensure_data_folder, resolve_data_folder, DEFAULT_PORT};
use sitepulse_common::db::init_database;
use sitepulse_common::db::settings::get_i64_setting;
use sitepulse_common::events::EventBus;

use sitepulse_audit::db::bundles::cleanup_stale_analyses;
use sitepulse_audit::AppState;

#[derive(Debug, Parser)]
#[command(name = "sitepulse-audit", version, about = "SitePulse website audit service")]
struct Args {
    /// Data folder holding the database (overrides SITEPULSE_DATA_FOLDER)
    #[arg(long)]
    data_folder: Option<String>,

    /// HTTP listen port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting sitepulse-audit service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let data_folder = resolve_data_folder(args.data_folder.as_deref(), "SITEPULSE_DATA_FOLDER");
    ensure_data_folder(&data_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize data folder: {}", e))?;

    let db_path = database_path(&data_folder);
    info!("Database: {}", db_path.display());

    let db_pool = init_database(&db_path).await?;
    info!("Database connection established");

    // Analyses left processing by a previous process run will never
    // complete; fail them before accepting new work
    let cleaned = cleanup_stale_analyses(&db_pool).await?;
    if cleaned > 0 {
        info!("Marked {} stale analyses as failed", cleaned);
    }

    let capacity = get_i64_setting(&db_pool, "event_bus_capacity", 100).await?.max(1) as usize;
    let event_bus = EventBus::new(capacity);
    info!("Event bus initialized (capacity {})", capacity);

    let state = AppState::new(db_pool, event_bus);
    let app = sitepulse_audit::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("Listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
