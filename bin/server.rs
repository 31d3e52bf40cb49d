// M&M Tracker - Web Server

use anyhow::{Context, Result};
use clap::Parser;
use mm_tracker::api::{router, AppState};
use mm_tracker::config::SecurityConfig;
use mm_tracker::email::LogMailer;
use mm_tracker::log::init_logging;
use mm_tracker::{setup_database, AppConfig, Services, SystemClock};
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about = "M&M Tracker API server")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long)]
    config_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = AppConfig::load(args.config_path.as_deref())?;
    if config.security.secret_key == SecurityConfig::default().secret_key {
        warn!("Using the built-in secret key; set security.secret_key for production");
    }

    let conn = Connection::open(&config.database.path)
        .with_context(|| format!("Failed to open database: {}", config.database.path))?;
    setup_database(&conn)?;
    info!(path = %config.database.path, "Database opened");

    let addr = config.server.bind_addr.clone();
    let mailer = LogMailer::new(&config.email.frontend_url);
    let services = Services::new(config, Arc::new(SystemClock), Arc::new(mailer))?;
    let app = router(AppState::new(conn, services));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, "Server running");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
