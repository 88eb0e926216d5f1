//! # Schema Migrations
//!
//! The ledger schema lives in `migrations/sqlite/NNN_description.sql` at the
//! workspace root and is compiled into the binary by `sqlx::migrate!`.
//!
//! ```text
//! 001_sales_ledger.sql   tills, receipts, orders, sales_ledger,
//!                        cash movements, laybye / account payments,
//!                        pos_settings
//! ```
//!
//! A schema change is always a new numbered file; applied files are
//! checksummed by sqlx and must never be edited.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Where a store stands against the embedded schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub embedded: usize,
    pub applied: usize,
    /// Embedded versions the store has not recorded as applied.
    pub pending: Vec<i64>,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Applies every pending migration, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = migration_status(pool).await?;
    if before.is_current() {
        info!(applied = before.applied, "Schema is current");
        return Ok(());
    }

    info!(pending = ?before.pending, "Applying migrations");
    MIGRATOR.run(pool).await?;
    info!(embedded = before.embedded, "Schema migrated");
    Ok(())
}

/// Compares the embedded migrations with the store's `_sqlx_migrations`.
///
/// A store that was never migrated has no bookkeeping table and reports
/// every embedded version as pending.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let has_table: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    let applied: Vec<i64> = if has_table {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    let pending: Vec<i64> = MIGRATOR
        .iter()
        .map(|m| m.version)
        .filter(|v| !applied.contains(v))
        .collect();

    let unknown = applied
        .iter()
        .filter(|v| !MIGRATOR.iter().any(|m| m.version == **v))
        .count();
    if unknown > 0 {
        warn!(unknown, "Store has migrations this build does not know about");
    }

    Ok(MigrationStatus {
        embedded: MIGRATOR.iter().count(),
        applied: applied.len(),
        pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn blank_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_blank_store_has_everything_pending() {
        let pool = blank_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.applied, 0);
        assert_eq!(status.pending.len(), status.embedded);
        assert!(!status.is_current());
    }

    #[tokio::test]
    async fn test_run_twice_is_harmless() {
        let pool = blank_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert!(status.is_current());
        assert_eq!(status.applied, status.embedded);
    }
}
