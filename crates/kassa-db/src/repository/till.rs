//! # Till Repository
//!
//! The Till Register: cash-drawer sessions and drawer reconciliation.
//!
//! ## Till Session
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Till Session                                      │
//! │                                                                         │
//! │  open_till(request, assigner)           (one transaction)              │
//! │     ├── teller already has an open till? → return it                   │
//! │     ├── daily_id = max for branch today + 1, probed past taken numbers │
//! │     ├── till_no  = YYYYMMDD‖daily_id                                   │
//! │     ├── INSERT tills                                                   │
//! │     └── assigner.assign(teller, till_no) ── failure rolls back INSERT  │
//! │                                                                         │
//! │  ... sales, payments, rollups ...                                      │
//! │                                                                         │
//! │  close_till()   → close cash + computed cash summary                   │
//! │  amend_till()   → supervisor correction after close                    │
//! │  confirm_till() → final counted summary, session locked                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cash In Till
//! ```text
//!   cash of POSTED receipts paid at the till (net of change)
//! + cash laybye instalments taken at the till
//! + cash account payments taken at the till
//! - cash rollups removed from the till
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use kassa_core::numbering;
use kassa_core::validation::{validate_person, validate_till};
use kassa_core::{CashSummary, Money, Till, TillAssigner, ValidationError};

use super::receipt::PAYMENT_TERMINAL_SQL;
use super::{decode_json, encode_json};
use crate::coordinator::{business_day, retry_on_conflict, settle, within, LedgerOptions};
use crate::error::{DbError, DbResult};

/// How far past the first free candidate a till number is probed.
const MAX_TILL_PROBES: usize = 100;

const TILL_SELECT: &str = r#"
    SELECT till_no, daily_id, company_id, open_time, open_float, teller,
           supervisor, branch, cash_outs, cash_summary, confirm_summary,
           close_time, close_cash, close_supervisor, amend_time, amend_amount,
           amend_reason, amend_supervisor, confirmed_by, confirmed
    FROM tills
"#;

#[derive(Debug, FromRow)]
struct TillRow {
    till_no: i64,
    daily_id: i64,
    company_id: i64,
    open_time: DateTime<Utc>,
    open_float: Money,
    teller: String,
    supervisor: String,
    branch: String,
    cash_outs: Money,
    cash_summary: String,
    confirm_summary: String,
    close_time: Option<DateTime<Utc>>,
    close_cash: Option<Money>,
    close_supervisor: Option<String>,
    amend_time: Option<DateTime<Utc>>,
    amend_amount: Money,
    amend_reason: Option<String>,
    amend_supervisor: Option<String>,
    confirmed_by: Option<String>,
    confirmed: bool,
}

impl TryFrom<TillRow> for Till {
    type Error = DbError;

    fn try_from(row: TillRow) -> DbResult<Till> {
        Ok(Till {
            till_no: row.till_no,
            daily_id: row.daily_id,
            company_id: row.company_id,
            open_time: row.open_time,
            open_float: row.open_float,
            teller: row.teller,
            supervisor: row.supervisor,
            branch: row.branch,
            cash_outs: row.cash_outs,
            cash_summary: decode_json("tills.cash_summary", &row.cash_summary)?,
            confirm_summary: decode_json("tills.confirm_summary", &row.confirm_summary)?,
            close_time: row.close_time,
            close_cash: row.close_cash,
            close_supervisor: row.close_supervisor,
            amend_time: row.amend_time,
            amend_amount: row.amend_amount,
            amend_reason: row.amend_reason,
            amend_supervisor: row.amend_supervisor,
            confirmed_by: row.confirmed_by,
            confirmed: row.confirmed,
        })
    }
}

/// Everything needed to open a till for a teller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTillRequest {
    pub teller: String,
    pub supervisor: String,
    pub branch: String,
    pub company_id: i64,
    pub open_float: Money,
}

// =============================================================================
// Shared Steps
// =============================================================================

async fn load_till<'e, E>(executor: E, till_no: i64) -> DbResult<Till>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE till_no = ?1", TILL_SELECT);
    let row = sqlx::query_as::<_, TillRow>(&sql)
        .bind(till_no)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DbError::not_found("Till", till_no))?;

    row.try_into()
}

async fn open_till_of<'e, E>(executor: E, teller: &str) -> DbResult<Option<Till>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE teller = ?1 AND close_time IS NULL", TILL_SELECT);
    let row = sqlx::query_as::<_, TillRow>(&sql)
        .bind(teller)
        .fetch_optional(executor)
        .await?;

    row.map(Till::try_from).transpose()
}

/// Picks the next free `(daily_id, till_no)` for `branch` on `day`.
///
/// Till numbers are global while daily ids are per branch, so two branches
/// opening their first till of the day collide on `till_no`; the candidate
/// is walked forward until it is free.
async fn allocate_till_number(
    conn: &mut SqliteConnection,
    branch: &str,
    day: NaiveDate,
) -> DbResult<(i64, i64)> {
    let mut daily_id: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(daily_id), 0) + 1 FROM tills WHERE branch = ?1 AND open_day = ?2",
    )
    .bind(branch)
    .bind(day)
    .fetch_one(&mut *conn)
    .await?;

    for _ in 0..MAX_TILL_PROBES {
        let till_no = numbering::till_number(day, daily_id)?;
        let taken: Option<i64> = sqlx::query_scalar("SELECT till_no FROM tills WHERE till_no = ?1")
            .bind(till_no)
            .fetch_optional(&mut *conn)
            .await?;

        if taken.is_none() {
            return Ok((daily_id, till_no));
        }
        debug!(till_no, "Till number taken, probing");
        daily_id += 1;
    }

    Err(DbError::duplicate("tills.till_no", format!("{} (day {})", branch, day)))
}

/// Payment totals taken at `till_no`, by tender.
async fn compute_cash_summary(conn: &mut SqliteConnection, till_no: i64) -> DbResult<CashSummary> {
    let sql = format!(
        r#"
        SELECT
            COALESCE(SUM(json_extract(pay_details, '$.cash')), 0),
            COALESCE(SUM(json_extract(pay_details, '$.mpesa')), 0),
            COALESCE(SUM(json_extract(pay_details, '$.ecard')), 0),
            COALESCE(SUM(json_extract(pay_details, '$.cheque')), 0)
        FROM receipts
        WHERE pay_till = ?1 AND state IN {}
        "#,
        PAYMENT_TERMINAL_SQL
    );
    let (cash, mobile, ecard, cheque): (i64, i64, i64, i64) = sqlx::query_as(&sql)
        .bind(till_no)
        .fetch_one(&mut *conn)
        .await?;

    let discount: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(discount), 0) FROM sales_ledger WHERE till_num = ?1",
    )
    .bind(till_no)
    .fetch_one(&mut *conn)
    .await?;

    Ok(CashSummary {
        cash: Money::from_cents(cash),
        mobile: Money::from_cents(mobile),
        ecard: Money::from_cents(ecard),
        cheque: Money::from_cents(cheque),
        returns: Money::zero(),
        discount: Money::from_cents(discount),
    })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the Till Register.
#[derive(Debug, Clone)]
pub struct TillRepository {
    pool: SqlitePool,
    ledger: LedgerOptions,
}

impl TillRepository {
    /// Creates a new TillRepository.
    pub fn new(pool: SqlitePool, ledger: LedgerOptions) -> Self {
        TillRepository { pool, ledger }
    }

    /// The teller's open till, if any.
    pub async fn open_for(&self, teller: &str) -> DbResult<Option<Till>> {
        within("open_for", self.ledger.deadlines.short, async {
            open_till_of(&self.pool, teller).await
        })
        .await
    }

    /// Whether the teller has an open till.
    pub async fn exists(&self, teller: &str) -> DbResult<bool> {
        Ok(self.open_for(teller).await?.is_some())
    }

    /// The `(daily_id, till_no)` the next till opened today at `branch` gets.
    pub async fn next_till_number(&self, branch: &str) -> DbResult<(i64, i64)> {
        within("next_till_number", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            allocate_till_number(&mut conn, branch, business_day(Utc::now())).await
        })
        .await
    }

    /// Opens a till for `request.teller`, or returns the one already open.
    ///
    /// `assigner` records the till against the teller in the user service;
    /// the till row is only committed if that call succeeds.
    pub async fn open_till(&self, request: &OpenTillRequest, assigner: &dyn TillAssigner) -> DbResult<Till> {
        validate_person("teller", &request.teller)?;
        validate_person("supervisor", &request.supervisor)?;
        if request.branch.trim().is_empty() {
            return Err(ValidationError::required("branch").into());
        }
        if request.open_float.is_negative() {
            return Err(ValidationError::MustBePositive {
                field: "open_float".to_string(),
            }
            .into());
        }

        if let Some(till) = self.open_for(&request.teller).await? {
            info!(teller = %request.teller, till_no = till.till_no, "Till already open");
            return Ok(till);
        }

        retry_on_conflict("open_till", move || self.try_open(request, assigner)).await
    }

    async fn try_open(&self, request: &OpenTillRequest, assigner: &dyn TillAssigner) -> DbResult<Till> {
        within("open_till", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<Till> = async {
                if let Some(till) = open_till_of(&mut *tx, &request.teller).await? {
                    return Ok(till);
                }

                let now = Utc::now();
                let day = business_day(now);
                let (daily_id, till_no) = allocate_till_number(&mut tx, &request.branch, day).await?;

                sqlx::query(
                    r#"
                    INSERT INTO tills (
                        till_no, daily_id, company_id, open_day, open_time,
                        open_float, teller, supervisor, branch
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .bind(till_no)
                .bind(daily_id)
                .bind(request.company_id)
                .bind(day)
                .bind(now)
                .bind(request.open_float)
                .bind(&request.teller)
                .bind(&request.supervisor)
                .bind(&request.branch)
                .execute(&mut *tx)
                .await?;

                assigner.assign(&request.teller, till_no).await?;

                info!(
                    till_no,
                    daily_id,
                    teller = %request.teller,
                    supervisor = %request.supervisor,
                    float = %request.open_float,
                    "Till opened"
                );
                load_till(&mut *tx, till_no).await
            }
            .await;
            settle(tx, result, "open_till").await
        })
        .await
    }

    /// Loads a till session.
    pub async fn fetch(&self, till_no: i64) -> DbResult<Till> {
        within("fetch_till", self.ledger.deadlines.short, async {
            load_till(&self.pool, till_no).await
        })
        .await
    }

    /// Payment totals taken at the till so far.
    pub async fn cash_summary(&self, till_no: i64) -> DbResult<CashSummary> {
        within("cash_summary", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            compute_cash_summary(&mut conn, till_no).await
        })
        .await
    }

    /// Cash that should be in the drawer right now.
    pub async fn cash_in_till(&self, till_no: i64) -> DbResult<Money> {
        validate_till(till_no)?;

        within("cash_in_till", self.ledger.deadlines.short, async {
            let cents: i64 = sqlx::query_scalar(
                r#"
                SELECT
                    COALESCE((SELECT SUM(json_extract(pay_details, '$.cash'))
                              FROM receipts
                              WHERE pay_till = ?1 AND state = 'POSTED'), 0)
                  + COALESCE((SELECT SUM(amount_paid)
                              FROM laybye_payments
                              WHERE till_num = ?1 AND pay_type = 'cash'), 0)
                  + COALESCE((SELECT SUM(cash_paid)
                              FROM account_payments
                              WHERE till_num = ?1), 0)
                  - COALESCE((SELECT SUM(amount)
                              FROM cash_movements
                              WHERE till_num = ?1 AND movement_type = 'cash rollup'), 0)
                "#,
            )
            .bind(till_no)
            .fetch_one(&self.pool)
            .await?;

            Ok(Money::from_cents(cents))
        })
        .await
    }

    /// Closes an open till, snapshotting its cash summary.
    pub async fn close_till(&self, till_no: i64, close_cash: Money, supervisor: &str) -> DbResult<Till> {
        validate_person("supervisor", supervisor)?;

        within("close_till", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<Till> = async {
                let till = load_till(&mut *tx, till_no).await?;
                if !till.is_open() {
                    return Err(DbError::conflict("Till", till_no, "till is already closed"));
                }

                let summary = compute_cash_summary(&mut tx, till_no).await?;
                sqlx::query(
                    r#"
                    UPDATE tills
                    SET close_time = ?1, close_cash = ?2, close_supervisor = ?3, cash_summary = ?4
                    WHERE till_no = ?5 AND close_time IS NULL
                    "#,
                )
                .bind(Utc::now())
                .bind(close_cash)
                .bind(supervisor)
                .bind(encode_json("tills.cash_summary", &summary)?)
                .bind(till_no)
                .execute(&mut *tx)
                .await?;

                info!(till_no, close_cash = %close_cash, counted_cash = %summary.cash, "Till closed");
                load_till(&mut *tx, till_no).await
            }
            .await;
            settle(tx, result, "close_till").await
        })
        .await
    }

    /// Records a supervisor's correction to a closed, unconfirmed till.
    pub async fn amend_till(
        &self,
        till_no: i64,
        amount: Money,
        reason: &str,
        supervisor: &str,
    ) -> DbResult<Till> {
        validate_person("supervisor", supervisor)?;
        if reason.trim().is_empty() {
            return Err(ValidationError::required("reason").into());
        }

        self.closed_till_update(
            "amend_till",
            till_no,
            sqlx::query(
                r#"
                UPDATE tills
                SET amend_time = ?1, amend_amount = ?2, amend_reason = ?3, amend_supervisor = ?4
                WHERE till_no = ?5 AND close_time IS NOT NULL AND confirmed = 0
                "#,
            )
            .bind(Utc::now())
            .bind(amount)
            .bind(reason)
            .bind(supervisor)
            .bind(till_no),
        )
        .await
    }

    /// Locks a closed till with the supervisor's counted summary.
    pub async fn confirm_till(&self, till_no: i64, confirmed_by: &str, summary: &CashSummary) -> DbResult<Till> {
        validate_person("confirmed_by", confirmed_by)?;
        let summary_json = encode_json("tills.confirm_summary", summary)?;

        self.closed_till_update(
            "confirm_till",
            till_no,
            sqlx::query(
                r#"
                UPDATE tills
                SET confirmed = 1, confirmed_by = ?1, confirm_summary = ?2
                WHERE till_no = ?3 AND close_time IS NOT NULL AND confirmed = 0
                "#,
            )
            .bind(confirmed_by)
            .bind(summary_json)
            .bind(till_no),
        )
        .await
    }

    async fn closed_till_update<'q>(
        &self,
        operation: &'static str,
        till_no: i64,
        query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> DbResult<Till> {
        within(operation, self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let result = query.execute(&mut *conn).await?;

            if result.rows_affected() == 0 {
                let till = load_till(&mut *conn, till_no).await?;
                let reason = if till.is_open() {
                    "till is still open"
                } else {
                    "till is already confirmed"
                };
                return Err(DbError::conflict("Till", till_no, reason));
            }

            info!(till_no, operation, "Till updated");
            load_till(&mut *conn, till_no).await
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
