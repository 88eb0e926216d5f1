//! # Store Handle
//!
//! Opens the SQLite ledger and hands out repositories that share one pool and
//! one set of [`LedgerOptions`].
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Ledger Store                                  │
//! │                                                                         │
//! │  DbConfig ── path, pool sizing, busy wait, LedgerOptions                │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  Database::new ── open file (or :memory:) ── migrate ── ready           │
//! │     │                                                                   │
//! │     ├── orders()    → OrderRepository     ┐                             │
//! │     ├── receipts()  → ReceiptRepository   │  pool clone +               │
//! │     ├── tills()     → TillRepository      │  LedgerOptions copy         │
//! │     ├── cash()      → CashRepository      │                             │
//! │     └── settings()  → SettingsRepository  ┘                             │
//! │                                                                         │
//! │  Repositories are cheap values; build one per request.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The file runs in WAL mode so readers (cart views, cash queries) are not
//! blocked while a close, merge or payment holds the write lock. Writers that
//! find the database locked wait up to `busy_timeout` before SQLite gives up
//! with `SQLITE_BUSY`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::coordinator::{Deadlines, LedgerOptions};
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cash::CashRepository;
use crate::repository::order::OrderRepository;
use crate::repository::receipt::ReceiptRepository;
use crate::repository::settings::SettingsRepository;
use crate::repository::till::TillRepository;

const MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the ledger store.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/kassa/ledger.db")
///     .max_connections(8)
///     .production_dispatch(true);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database file; `:memory:` for a private in-process store.
    pub path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Longest a caller waits for a free pooled connection.
    pub acquire_timeout: Duration,
    /// Longest a writer waits on a locked database file.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
    pub ledger: LedgerOptions,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            path: path.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            ledger: LedgerOptions::default(),
        }
    }

    /// A private store for tests.
    ///
    /// Every `:memory:` connection is its own database, so the pool is
    /// pinned to exactly one connection.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            ..DbConfig::new(MEMORY)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn deadlines(mut self, deadlines: Deadlines) -> Self {
        self.ledger.deadlines = deadlines;
        self
    }

    /// Completed orders wait in `ordered` until production dispatches them.
    pub fn production_dispatch(mut self, enabled: bool) -> Self {
        self.ledger.production_dispatch = enabled;
        self
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let base = if self.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
        };

        Ok(base
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Database
// =============================================================================

/// The open ledger store.
///
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("ledger.db")).await?;
/// let receipt_num = db.receipts().gen_receipt(&poster, SaleType::CashSale).await?;
/// let order_num = db.orders().new_order(&poster, receipt_num, None).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    ledger: LedgerOptions,
}

impl Database {
    /// Opens the store, creating the file if needed, and applies pending
    /// migrations unless the config turns them off.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.path.display(), "Opening ledger store");

        let options = config.connect_options()?;
        debug!(busy_timeout_ms = config.busy_timeout.as_millis() as u64, "SQLite options ready");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections.min(config.max_connections))
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let db = Database {
            pool,
            ledger: config.ledger,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        info!(
            max_connections = config.max_connections,
            production_dispatch = db.ledger.production_dispatch,
            short_deadline_ms = db.ledger.deadlines.short.as_millis() as u64,
            long_deadline_ms = db.ledger.deadlines.long.as_millis() as u64,
            "Ledger store ready"
        );
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ledger_options(&self) -> LedgerOptions {
        self.ledger
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone(), self.ledger)
    }

    pub fn receipts(&self) -> ReceiptRepository {
        ReceiptRepository::new(self.pool.clone(), self.ledger)
    }

    pub fn tills(&self) -> TillRepository {
        TillRepository::new(self.pool.clone(), self.ledger)
    }

    pub fn cash(&self) -> CashRepository {
        CashRepository::new(self.pool.clone(), self.ledger)
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone(), self.ledger)
    }

    /// Round-trips a trivial query; fails when no connection can be had.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Waits for checked-out connections to return, then closes the pool.
    pub async fn close(&self) {
        info!("Closing ledger store");
        self.pool.close().await;
    }
}
