//! ietrack-server - independent expenditure tracker
//!
//! Serves listings and exports over HTTP, or with `--sync-once` performs a
//! single sync for the business date and exits (for cron-driven schedules).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ietrack_common::config::{load_toml_config, AppConfig, ConfigOverrides, API_KEY_ENV};
use ietrack_common::db::init_database;
use ietrack_server::client::{ClientTuning, ProPublicaClient};
use ietrack_server::filings::{HttpFormScraper, SCRAPE_INTERVAL};
use ietrack_server::notify;
use ietrack_server::store::SqliteRecordStore;
use ietrack_server::sync::SyncOptions;
use ietrack_server::{build_router, AppState, Settings};

/// Command-line arguments for ietrack-server
#[derive(Parser, Debug)]
#[command(name = "ietrack-server")]
#[command(about = "Independent expenditure sync and reconciliation service")]
#[command(version)]
struct Args {
    /// Config file (default: <config_dir>/ietrack/config.toml)
    #[arg(short, long, env = "IETRACK_CONFIG")]
    config: Option<PathBuf>,

    /// ProPublica API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Election cycle year used to scope API queries
    #[arg(long, env = "IETRACK_CYCLE")]
    cycle: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "IETRACK_DATABASE")]
    database: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "IETRACK_BIND")]
    bind: Option<String>,

    /// Business date override (YYYY-MM-DD)
    #[arg(long, env = "IETRACK_TODAY")]
    today: Option<NaiveDate>,

    /// Hours from UTC used to derive the business date
    #[arg(long, env = "IETRACK_UTC_OFFSET", allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    /// Rows shown when a listing falls back to recent records
    #[arg(long, env = "IETRACK_FALLBACK_ROWS")]
    fallback_rows: Option<u32>,

    /// Received-date window tried before the recent-rows fallback (0 = off)
    #[arg(long, env = "IETRACK_FALLBACK_DAYS")]
    fallback_days: Option<u32>,

    /// Run one sync for the business date and exit
    #[arg(long)]
    sync_once: bool,

    /// Skip the notification when running with --sync-once
    #[arg(long, requires = "sync_once")]
    no_notify: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            cycle: self.cycle,
            api_key: self.api_key.clone(),
            api_base_url: None,
            database_path: self.database.clone(),
            bind_addr: self.bind.clone(),
            utc_offset_hours: self.utc_offset,
            today: self.today,
            fallback_rows: self.fallback_rows,
            fallback_days: self.fallback_days,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ietrack_server=info,ietrack_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ietrack-server v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let file = load_toml_config(args.config.as_deref()).context("Failed to load config file")?;
    let config = AppConfig::resolve(args.overrides(), file).context("Invalid configuration")?;
    info!(
        cycle = config.cycle,
        today = %config.today(),
        "Configuration resolved"
    );
    info!("Database path: {}", config.database_path.display());

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let upstream = Arc::new(
        ProPublicaClient::new(config.api_root(), config.api_key.clone(), ClientTuning::default())
            .context("Failed to build API client")?,
    );
    let scraper = Arc::new(
        HttpFormScraper::new(SCRAPE_INTERVAL).context("Failed to build scraper client")?,
    );
    let notifier: Arc<dyn notify::Notifier> = Arc::from(notify::from_config(&config.notify));
    let store = Arc::new(SqliteRecordStore::new(pool));

    let state = AppState::new(
        store,
        upstream,
        scraper,
        notifier,
        Settings::from_config(&config),
    );

    if args.sync_once {
        let date = state.settings.today();
        let options = SyncOptions {
            notify: !args.no_notify,
        };
        return match state.pipeline.run(date, options).await {
            Ok(outcome) => {
                info!(
                    %date,
                    fetched = outcome.fetched,
                    inserted = outcome.inserted,
                    "Sync complete"
                );
                Ok(())
            }
            Err(e) => {
                error!(%date, error = %e, "Sync failed");
                Err(e).context("Sync run failed")
            }
        };
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("ietrack-server listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
