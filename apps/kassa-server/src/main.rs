//! # kassa-server
//!
//! Boots the sales ledger: configuration, store, remote clients and the
//! settings cache, then waits for a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kassa_db::migrations::migration_status;
use kassa_db::Database;
use kassa_server::{AppState, RemoteClients, ServerConfig, SettingsCache};

#[derive(Debug, Parser)]
#[command(name = "kassa-server", version, about = "Point-of-sale sales ledger")]
struct Cli {
    /// Configuration file (TOML); `KASSA__*` variables override it
    #[arg(long, env = "KASSA_CONFIG")]
    config: Option<PathBuf>,

    /// Apply pending migrations at startup even if the config disables it
    #[arg(long)]
    init_db: bool,

    /// Use mutual TLS toward the user and inventory services
    #[arg(long)]
    tls: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the ledger and run until interrupted (default)
    Serve,
    /// Apply migrations and report the schema state
    Migrate,
    /// Print the cash a till should hold
    CashInTill {
        #[arg(long)]
        till: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,kassa=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.tls {
        config.server.tls_enabled = true;
        config.validate().context("validating configuration")?;
    }
    if cli.init_db {
        config.database.run_migrations = true;
    }
    info!(
        database = %config.database.path.display(),
        directory = %config.remote.directory_url,
        inventory = %config.remote.inventory_url,
        tls = config.server.tls_enabled,
        "Configuration loaded"
    );

    let command = cli.command.unwrap_or(Command::Serve);
    if let Command::Migrate = command {
        config.database.run_migrations = true;
    }

    let db = Database::new(config.db_config())
        .await
        .context("opening the ledger store")?;

    match command {
        Command::Migrate => {
            let status = migration_status(db.pool()).await?;
            println!(
                "migrations: {} applied of {} embedded, pending {:?}",
                status.applied, status.embedded, status.pending
            );
            db.close().await;
        }
        Command::CashInTill { till } => {
            let cash = db.tills().cash_in_till(till).await?;
            println!("till {}: {}", till, cash);
            db.close().await;
        }
        Command::Serve => serve(db, config).await?,
    }

    Ok(())
}

async fn serve(db: Database, config: ServerConfig) -> anyhow::Result<()> {
    let remote = RemoteClients::connect(&config).context("configuring remote clients")?;

    let cache = match config.cache.redis_url.as_deref() {
        Some(url) => match redis::Client::open(url) {
            Ok(client) => {
                info!("Settings cache enabled");
                Some(SettingsCache::new(client, config.cache.settings_ttl_secs))
            }
            Err(e) => {
                warn!(error = %e, "Invalid Redis URL, continuing without the settings cache");
                None
            }
        },
        None => None,
    };

    let state = Arc::new(AppState::new(db, remote, cache, config));

    match state.settings.load().await {
        Ok(settings) => info!(
            approve_sales = settings.approve_sales,
            allow_suspend = settings.allow_suspend,
            "POS settings loaded"
        ),
        Err(e) => warn!(error = %e, "POS settings unavailable, using defaults until saved"),
    }

    state.db.ping().await.context("checking the ledger store")?;
    info!("Ledger ready");
    shutdown_signal().await;

    state.db.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
