//! # kassa-db: Sales Ledger Store
//!
//! Persistence for orders, receipts, tills and cash movements, plus the
//! transaction coordinator that keeps multi-record operations atomic.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Data Flow                                  │
//! │                                                                         │
//! │  kassa-server service (close_bill, merge, open_till, ...)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kassa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ OrderRepo      │    │  (embedded)  │  │   │
//! │  │   │               │◄───│ ReceiptRepo    │    │ 001_sales_   │  │   │
//! │  │   │ SqlitePool    │    │ TillRepo       │    │   ledger.sql │  │   │
//! │  │   │ LedgerOptions │    │ CashRepo       │    │              │  │   │
//! │  │   └───────────────┘    └───────┬────────┘    └──────────────┘  │   │
//! │  │                                │                                │   │
//! │  │                     ┌──────────▼──────────┐                     │   │
//! │  │                     │    coordinator      │                     │   │
//! │  │                     │ within / settle /   │                     │   │
//! │  │                     │ retry_on_conflict   │                     │   │
//! │  │                     └─────────────────────┘                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`coordinator`] - Deadlines, commit/rollback, conflict retries
//! - [`error`] - Database error types
//! - [`repository`] - Order, receipt, till, cash and settings repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let receipt = db.receipts().gen_receipt(&poster, SaleType::CashSale).await?;
//! let bill = db.receipts().close_bill(receipt).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod coordinator;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use coordinator::{Deadlines, LedgerOptions};
pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cash::{AccountPayment, CashMovement, CashRepository};
pub use repository::order::OrderRepository;
pub use repository::receipt::{ReceiptRepository, Tender, VoidOutcome};
pub use repository::settings::SettingsRepository;
pub use repository::till::{OpenTillRequest, TillRepository};
