//! # Transaction Coordinator
//!
//! Deadlines, atomic commit/rollback and conflict retries shared by every
//! repository.
//!
//! ## Shape of a Compound Operation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  within("merge", deadlines.long, async {                               │
//! │      let mut tx = pool.begin().await?;                                 │
//! │      let result = async {                                              │
//! │          step_1(&mut tx).await?;   ── each step takes the same         │
//! │          step_2(&mut tx).await?;      &mut SqliteConnection            │
//! │          step_3(&mut tx).await                                         │
//! │      }.await;                                                          │
//! │      settle(tx, result, "merge").await   ── Ok  → COMMIT               │
//! │  })                                          Err → ROLLBACK, error     │
//! │                                                    returned untouched  │
//! │                                                                         │
//! │  Deadline elapses mid-flight → the future (and its transaction) is     │
//! │  dropped, SQLite rolls back, caller sees DbError::DeadlineExceeded.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Budgets
//! | Class | Default | Used by |
//! |-------|---------|---------|
//! | short | 15 s    | single-row reads and writes, order completion |
//! | long  | 30 s    | close bill, merge, resume, payment, till open |

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::warn;

use crate::error::{DbError, DbResult};

// =============================================================================
// Configuration
// =============================================================================

/// Per-class deadlines for store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub short: Duration,
    pub long: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Deadlines {
            short: Duration::from_secs(15),
            long: Duration::from_secs(30),
        }
    }
}

/// Ledger behaviour handed to every repository at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerOptions {
    pub deadlines: Deadlines,
    /// Completed orders stop at `ordered` until production dispatches them.
    pub production_dispatch: bool,
}

/// How many times a unique-key collision is retried before giving up.
pub const MAX_CONFLICT_RETRIES: u32 = 5;

// =============================================================================
// Deadline
// =============================================================================

/// Runs `operation` under `budget`.
///
/// On expiry the future is dropped, which drops any open transaction and
/// rolls it back.
pub async fn within<T, F>(operation: &'static str, budget: Duration, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, budget_ms = budget.as_millis() as u64, "Store operation deadline exceeded");
            Err(DbError::DeadlineExceeded { operation, budget })
        }
    }
}

// =============================================================================
// Commit / Rollback
// =============================================================================

/// Commits `tx` when `result` is Ok, rolls it back otherwise.
///
/// The step error is returned as-is; a failing rollback is only logged so it
/// never masks the error that caused it.
pub async fn settle<T>(
    tx: Transaction<'static, Sqlite>,
    result: DbResult<T>,
    operation: &'static str,
) -> DbResult<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| DbError::TransactionFailed(format!("{}: commit: {}", operation, e)))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(operation, error = %rollback_err, "Rollback failed");
            }
            warn!(operation, error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}

// =============================================================================
// Conflict Retry
// =============================================================================

/// Re-runs `attempt` while it fails with a unique-key collision.
///
/// Used where a number is derived from "max + 1" inside a transaction and a
/// concurrent writer may have claimed it first. Backs off exponentially,
/// starting at 20 ms and capped at 500 ms, for at most
/// [`MAX_CONFLICT_RETRIES`] retries.
pub async fn retry_on_conflict<T, F, Fut>(operation: &'static str, mut attempt: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut backoff = ExponentialBackoff {
        current_interval: Duration::from_millis(20),
        initial_interval: Duration::from_millis(20),
        max_interval: Duration::from_millis(500),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };
    let mut retries = 0u32;

    loop {
        match attempt().await {
            Err(DbError::UniqueViolation { field, .. }) if retries < MAX_CONFLICT_RETRIES => {
                retries += 1;
                let wait = backoff.next_backoff().unwrap_or(backoff.max_interval);
                warn!(
                    operation,
                    field = %field,
                    retries,
                    wait_ms = wait.as_millis() as u64,
                    "Unique key collision, retrying"
                );
                tokio::time::sleep(wait).await;
            }
            other => return other,
        }
    }
}

// =============================================================================
// Business Day
// =============================================================================

/// The business day a timestamp belongs to. Per-day sequences key on this.
pub fn business_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_within_passes_result_through() {
        let value = within("noop", Duration::from_secs(1), async { Ok::<_, DbError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_within_reports_deadline() {
        let err = within("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, DbError::DeadlineExceeded { operation: "slow", .. }));
    }

    #[tokio::test]
    async fn test_retry_on_conflict_retries_unique_violations() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = retry_on_conflict("alloc", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DbError::duplicate("tills.till_no", "202610161"))
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = retry_on_conflict("alloc", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(DbError::duplicate("tills.till_no", "202610161"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_CONFLICT_RETRIES + 1);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_does_not_retry_other_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _ = retry_on_conflict("alloc", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(DbError::not_found("Till", 1))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
