//! # Receipt Repository
//!
//! The Receipt Ledger: customer bills, their carts and the compound
//! operations that move orders between them.
//!
//! ## Receipt Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Receipt Lifecycle                                 │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── gen_receipt() → reuses the till's open bill or allocates       │
//! │                         1‖YYYYMMDD‖0‖count                              │
//! │                                                                         │
//! │  2. CLOSE BILL  (one transaction)                                      │
//! │     └── cart  ← lines of dispatched and paying orders                  │
//! │     └── receipt → pending payment, total and order count re-derived    │
//! │     └── dispatched orders → paying                                     │
//! │                                                                         │
//! │  3. PAY                                                                │
//! │     └── begin_payment() → paying                                       │
//! │     └── post_payment()  → POSTED / PAID / ...  + sales ledger rows     │
//! │                                                                         │
//! │  SIDE PATHS                                                            │
//! │     └── resume()   → pending, paying orders back to dispatched         │
//! │     └── suspend()  → parks pending bills that hold a cart              │
//! │     └── merge()    → sources VOIDED, their orders folded into target   │
//! │     └── void() / del_cascade() → VOIDED (orders DELETED)               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A receipt's `total` is never written on its own: every write that touches
//! `cart` recomputes it from the live lines in the same statement.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use kassa_core::cart;
use kassa_core::numbering;
use kassa_core::validation::{validate_person, validate_till};
use kassa_core::{
    Analysis, CoreError, LineItem, Money, OrderState, PayDetails, Poster, ReceiptLog,
    ReceiptState, SaleType, ValidationError,
};

use super::ledger::{self, LedgerLine};
use super::order::orders_of_receipt;
use super::{decode_json, encode_json};
use crate::coordinator::{business_day, retry_on_conflict, settle, within, LedgerOptions};
use crate::error::{DbError, DbResult};

const RECEIPT_SELECT: &str = r#"
    SELECT receipt_num, trans_date, till_num, pay_till, company_id, daily_count,
           branch, poster, sale_type, total, cash, change_due, cart, pay_details,
           state, approver, ac_num, laybye_id, last_updated, orders_in_bill,
           analysis, version
    FROM receipts
"#;

/// SQL list of the states a receipt can be paid into.
pub(crate) const PAYMENT_TERMINAL_SQL: &str =
    "('POSTED', 'DEBITED', 'CREDITED', 'PAID', 'AWAITING RECEIPT')";

#[derive(Debug, FromRow)]
struct ReceiptRow {
    receipt_num: i64,
    trans_date: DateTime<Utc>,
    till_num: i64,
    pay_till: i64,
    company_id: i64,
    daily_count: i64,
    branch: String,
    poster: String,
    sale_type: SaleType,
    total: Money,
    cash: Money,
    change_due: Money,
    cart: Option<String>,
    pay_details: String,
    state: ReceiptState,
    approver: String,
    ac_num: Option<String>,
    laybye_id: i64,
    last_updated: DateTime<Utc>,
    orders_in_bill: i64,
    analysis: Option<String>,
    version: i64,
}

impl TryFrom<ReceiptRow> for ReceiptLog {
    type Error = DbError;

    fn try_from(row: ReceiptRow) -> DbResult<ReceiptLog> {
        let cart: Vec<LineItem> = match row.cart.as_deref() {
            Some(raw) => decode_json("receipts.cart", raw)?,
            None => Vec::new(),
        };
        let analysis = match row.analysis.as_deref() {
            Some(raw) => Some(decode_json("receipts.analysis", raw)?),
            None => None,
        };

        Ok(ReceiptLog {
            receipt_num: row.receipt_num,
            trans_date: row.trans_date,
            till_num: row.till_num,
            pay_till: row.pay_till,
            company_id: row.company_id,
            daily_count: row.daily_count,
            branch: row.branch,
            poster: row.poster,
            sale_type: row.sale_type,
            total: row.total,
            cash: row.cash,
            change: row.change_due,
            cart,
            pay_details: decode_json("receipts.pay_details", &row.pay_details)?,
            state: row.state,
            approver: row.approver,
            ac_num: row.ac_num,
            laybye_id: row.laybye_id,
            last_updated: row.last_updated,
            orders_in_bill: row.orders_in_bill,
            analysis,
            version: row.version,
        })
    }
}

/// What a void did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoidOutcome {
    Voided,
    AlreadyVoided,
}

/// How a bill is being settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    pub pay_details: PayDetails,
    /// Till that took the money.
    pub pay_till: i64,
    pub approver: String,
    /// Payment-terminal state the receipt ends in.
    pub outcome: ReceiptState,
}

// =============================================================================
// Shared Steps
// =============================================================================

async fn load_receipt<'e, E>(executor: E, receipt_num: i64) -> DbResult<ReceiptLog>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE receipt_num = ?1", RECEIPT_SELECT);
    let row = sqlx::query_as::<_, ReceiptRow>(&sql)
        .bind(receipt_num)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DbError::not_found("Receipt", receipt_num))?;

    row.try_into()
}

async fn receipt_state(conn: &mut SqliteConnection, receipt_num: i64) -> DbResult<Option<ReceiptState>> {
    let state = sqlx::query_scalar::<_, ReceiptState>("SELECT state FROM receipts WHERE receipt_num = ?1")
        .bind(receipt_num)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(state)
}

/// Turns a guarded UPDATE that matched nothing into NotFound or Conflict.
async fn explain_miss(conn: &mut SqliteConnection, receipt_num: i64, wanted: &str) -> DbError {
    match receipt_state(conn, receipt_num).await {
        Ok(None) => DbError::not_found("Receipt", receipt_num),
        Ok(Some(state)) => DbError::conflict(
            "Receipt",
            receipt_num,
            format!("receipt is {}, {}", state.as_str(), wanted),
        ),
        Err(e) => e,
    }
}

/// Lines and order count of the orders billed on `receipt_num`.
async fn billed_lines(conn: &mut SqliteConnection, receipt_num: i64) -> DbResult<(Vec<LineItem>, i64)> {
    let orders = orders_of_receipt(
        conn,
        receipt_num,
        &[OrderState::Dispatched, OrderState::Paying],
    )
    .await?;

    let count = orders.len() as i64;
    let lines = orders.into_iter().flat_map(|o| o.items).collect();
    Ok((lines, count))
}

/// Voids one receipt unless it has been paid.
async fn void_step(conn: &mut SqliteConnection, receipt_num: i64) -> DbResult<VoidOutcome> {
    let sql = format!(
        r#"
        UPDATE receipts
        SET state = 'VOIDED', last_updated = ?1, version = version + 1
        WHERE receipt_num = ?2 AND state NOT IN {} AND state != 'VOIDED'
        "#,
        PAYMENT_TERMINAL_SQL
    );
    let result = sqlx::query(&sql)
        .bind(Utc::now())
        .bind(receipt_num)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 1 {
        return Ok(VoidOutcome::Voided);
    }

    match receipt_state(conn, receipt_num).await? {
        None => Err(DbError::not_found("Receipt", receipt_num)),
        Some(ReceiptState::Voided) => Ok(VoidOutcome::AlreadyVoided),
        Some(state) => Err(DbError::conflict(
            "Receipt",
            receipt_num,
            format!("a {} receipt cannot be voided", state.as_str()),
        )),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the Receipt Ledger.
#[derive(Debug, Clone)]
pub struct ReceiptRepository {
    pool: SqlitePool,
    ledger: LedgerOptions,
}

impl ReceiptRepository {
    /// Creates a new ReceiptRepository.
    pub fn new(pool: SqlitePool, ledger: LedgerOptions) -> Self {
        ReceiptRepository { pool, ledger }
    }

    /// Returns the till's open bill of `sale_type`, creating one if none.
    pub async fn gen_receipt(&self, poster: &Poster, sale_type: SaleType) -> DbResult<i64> {
        if poster.till_num <= 0 {
            return Err(CoreError::TillRequired.into());
        }

        let existing = within("gen_receipt", self.ledger.deadlines.short, async {
            let receipt_num: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT MAX(receipt_num) FROM receipts
                WHERE till_num = ?1 AND sale_type = ?2 AND state IN ('pending', 'paying')
                "#,
            )
            .bind(poster.till_num)
            .bind(sale_type)
            .fetch_one(&self.pool)
            .await?;
            Ok(receipt_num)
        })
        .await?;

        match existing {
            Some(receipt_num) => {
                debug!(receipt_num, till_num = poster.till_num, "Reusing open receipt");
                Ok(receipt_num)
            }
            None => self.create_receipt(poster, sale_type).await,
        }
    }

    /// Allocates a new receipt number and inserts an empty pending receipt.
    pub async fn create_receipt(&self, poster: &Poster, sale_type: SaleType) -> DbResult<i64> {
        validate_person("poster", &poster.username)?;
        validate_till(poster.till_num)?;

        retry_on_conflict("create_receipt", move || self.try_create(poster, sale_type)).await
    }

    async fn try_create(&self, poster: &Poster, sale_type: SaleType) -> DbResult<i64> {
        within("create_receipt", self.ledger.deadlines.short, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<i64> = async {
                let now = Utc::now();
                let day = business_day(now);

                let daily_count: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(MAX(daily_count), 0) + 1 FROM receipts WHERE trans_day = ?1",
                )
                .bind(day)
                .fetch_one(&mut *tx)
                .await?;

                let receipt_num = numbering::receipt_number(day, daily_count)?;
                let pay_till = if poster.accepts_payment { poster.till_num } else { 0 };

                sqlx::query(
                    r#"
                    INSERT INTO receipts (
                        receipt_num, trans_day, trans_date, till_num, pay_till,
                        company_id, daily_count, branch, poster, sale_type,
                        state, last_updated
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?3)
                    "#,
                )
                .bind(receipt_num)
                .bind(day)
                .bind(now)
                .bind(poster.till_num)
                .bind(pay_till)
                .bind(poster.company_id)
                .bind(daily_count)
                .bind(&poster.branch)
                .bind(&poster.username)
                .bind(sale_type)
                .bind(ReceiptState::Pending)
                .execute(&mut *tx)
                .await?;

                info!(receipt_num, till_num = poster.till_num, "Receipt opened");
                Ok(receipt_num)
            }
            .await;
            settle(tx, result, "create_receipt").await
        })
        .await
    }

    /// A receipt as the cashier sees it: live lines only, total re-derived.
    pub async fn fetch(&self, receipt_num: i64) -> DbResult<ReceiptLog> {
        let mut receipt = self.fetch_all(receipt_num).await?;
        receipt.cart = cart::pending_items(&receipt.cart);
        receipt.total = cart::cart_total(&receipt.cart);
        Ok(receipt)
    }

    /// The full stored receipt, deleted lines included.
    pub async fn fetch_all(&self, receipt_num: i64) -> DbResult<ReceiptLog> {
        within("fetch_receipt", self.ledger.deadlines.short, async {
            load_receipt(&self.pool, receipt_num).await
        })
        .await
    }

    /// Receipts of a till in `state`, newest first.
    pub async fn list_by_state(&self, till_num: i64, state: ReceiptState) -> DbResult<Vec<ReceiptLog>> {
        within("list_receipts", self.ledger.deadlines.short, async {
            let sql = format!(
                "{} WHERE till_num = ?1 AND state = ?2 ORDER BY receipt_num DESC",
                RECEIPT_SELECT
            );
            let rows = sqlx::query_as::<_, ReceiptRow>(&sql)
                .bind(till_num)
                .bind(state)
                .fetch_all(&self.pool)
                .await?;
            rows.into_iter().map(ReceiptLog::try_from).collect()
        })
        .await
    }

    /// Sales ledger rows written for `receipt_num`.
    pub async fn ledger_lines(&self, receipt_num: i64) -> DbResult<Vec<LedgerLine>> {
        within("ledger_lines", self.ledger.deadlines.short, async {
            ledger::lines_for_receipt(&self.pool, receipt_num).await
        })
        .await
    }

    /// Stores `receipt.cart`, recomputing the total.
    ///
    /// `state` defaults to pending payment. Fails when the receipt changed
    /// since `receipt.version` was read.
    pub async fn update_cart(&self, receipt: &ReceiptLog, state: Option<ReceiptState>) -> DbResult<ReceiptLog> {
        if receipt.receipt_num <= 0 {
            return Err(ValidationError::required("receipt_num").into());
        }
        if receipt.cart.is_empty() {
            return Err(ValidationError::required("cart").into());
        }

        let state = state.unwrap_or(ReceiptState::PendingPayment);
        let total = cart::cart_total(&receipt.cart);
        let cart_json = encode_json("receipts.cart", &receipt.cart)?;

        within("update_cart", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let result = sqlx::query(
                r#"
                UPDATE receipts
                SET cart = ?1, total = ?2, state = ?3, orders_in_bill = ?4,
                    last_updated = ?5, version = version + 1
                WHERE receipt_num = ?6 AND version = ?7
                "#,
            )
            .bind(&cart_json)
            .bind(total)
            .bind(state)
            .bind(receipt.orders_in_bill)
            .bind(Utc::now())
            .bind(receipt.receipt_num)
            .bind(receipt.version)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(explain_miss(&mut conn, receipt.receipt_num, "modified concurrently").await);
            }
            load_receipt(&mut *conn, receipt.receipt_num).await
        })
        .await
    }

    /// Lines of every dispatched or paying order billed on `receipt_num`.
    pub async fn combine_orders_in_bill(&self, receipt_num: i64) -> DbResult<Vec<LineItem>> {
        within("combine_orders_in_bill", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let (lines, _) = billed_lines(&mut conn, receipt_num).await?;
            Ok(lines)
        })
        .await
    }

    /// Closes a bill for payment.
    ///
    /// ## What This Does (one transaction)
    /// 1. Checks the receipt is pending or pending payment
    /// 2. Builds the cart from its dispatched and paying orders
    /// 3. Stores cart, total and order count; receipt → pending payment
    /// 4. Dispatched orders → paying
    ///
    /// Any failing step leaves receipt and orders exactly as they were.
    pub async fn close_bill(&self, receipt_num: i64) -> DbResult<ReceiptLog> {
        within("close_bill", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<ReceiptLog> = async {
                let receipt = load_receipt(&mut *tx, receipt_num).await?;
                if !matches!(receipt.state, ReceiptState::Pending | ReceiptState::PendingPayment) {
                    return Err(DbError::conflict(
                        "Receipt",
                        receipt_num,
                        format!("cannot close a {} bill", receipt.state.as_str()),
                    ));
                }

                let (lines, orders_in_bill) = billed_lines(&mut tx, receipt_num).await?;
                if lines.is_empty() {
                    return Err(ValidationError::required("cart").into());
                }
                let total = cart::cart_total(&lines);
                let cart_json = encode_json("receipts.cart", &lines)?;

                let updated = sqlx::query(
                    r#"
                    UPDATE receipts
                    SET cart = ?1, total = ?2, state = 'pending payment',
                        orders_in_bill = ?3, last_updated = ?4, version = version + 1
                    WHERE receipt_num = ?5 AND version = ?6
                    "#,
                )
                .bind(&cart_json)
                .bind(total)
                .bind(orders_in_bill)
                .bind(Utc::now())
                .bind(receipt_num)
                .bind(receipt.version)
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(explain_miss(&mut tx, receipt_num, "modified concurrently").await);
                }

                let moved = sqlx::query(
                    r#"
                    UPDATE orders SET state = 'paying', version = version + 1
                    WHERE receipt_num = ?1 AND state = 'dispatched'
                    "#,
                )
                .bind(receipt_num)
                .execute(&mut *tx)
                .await?;

                info!(
                    receipt_num,
                    total = %total,
                    orders_in_bill,
                    orders_moved = moved.rows_affected(),
                    "Bill closed"
                );
                load_receipt(&mut *tx, receipt_num).await
            }
            .await;
            settle(tx, result, "close_bill").await
        })
        .await
    }

    /// Folds `sources` into `target`.
    ///
    /// ## What This Does (one transaction)
    /// 1. Live orders of the sources are re-homed on the target as paying
    /// 2. The sources are voided
    /// 3. The target's own dispatched orders become paying
    /// 4. The target's cart is rebuilt from its paying orders
    /// 5. The target becomes pending payment
    ///
    /// ## Errors
    /// * Validation - no sources, or the target listed among them
    /// * NotFound - target or a source does not exist
    /// * Conflict - target is not open, or a source has been paid or voided
    pub async fn merge(&self, target: i64, sources: &[i64]) -> DbResult<ReceiptLog> {
        let sources: BTreeSet<i64> = sources.iter().copied().collect();
        if sources.is_empty() {
            return Err(ValidationError::required("sources").into());
        }
        if sources.contains(&target) {
            return Err(ValidationError::InvalidFormat {
                field: "sources".to_string(),
                reason: format!("target receipt {} cannot merge into itself", target),
            }
            .into());
        }

        within("merge", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<ReceiptLog> = async {
                let target_receipt = load_receipt(&mut *tx, target).await?;
                if !target_receipt.state.is_open() {
                    return Err(DbError::conflict(
                        "Receipt",
                        target,
                        format!("cannot merge into a {} receipt", target_receipt.state.as_str()),
                    ));
                }

                for &source in &sources {
                    match receipt_state(&mut tx, source).await? {
                        None => return Err(DbError::not_found("Receipt", source)),
                        Some(state) if state.is_payment_terminal() || state == ReceiptState::Voided => {
                            return Err(DbError::conflict(
                                "Receipt",
                                source,
                                format!("a {} receipt cannot be merged", state.as_str()),
                            ));
                        }
                        Some(_) => {}
                    }
                }

                let mut reassign = sqlx::QueryBuilder::<Sqlite>::new(
                    "UPDATE orders SET state = 'paying', version = version + 1, receipt_num = ",
                );
                reassign.push_bind(target);
                reassign.push(" WHERE state NOT IN ('pending', 'DELETED', 'VOIDED') AND receipt_num IN (");
                let mut list = reassign.separated(", ");
                for &source in &sources {
                    list.push_bind(source);
                }
                list.push_unseparated(")");
                let reassigned = reassign.build().execute(&mut *tx).await?;

                let mut void = sqlx::QueryBuilder::<Sqlite>::new(
                    "UPDATE receipts SET state = 'VOIDED', version = version + 1, last_updated = ",
                );
                void.push_bind(Utc::now());
                void.push(" WHERE receipt_num IN (");
                let mut list = void.separated(", ");
                for &source in &sources {
                    list.push_bind(source);
                }
                list.push_unseparated(")");
                void.build().execute(&mut *tx).await?;

                sqlx::query(
                    r#"
                    UPDATE orders SET state = 'paying', version = version + 1
                    WHERE receipt_num = ?1 AND state = 'dispatched'
                    "#,
                )
                .bind(target)
                .execute(&mut *tx)
                .await?;

                let paying = orders_of_receipt(&mut tx, target, &[OrderState::Paying]).await?;
                let orders_in_bill = paying.len() as i64;
                let lines: Vec<LineItem> = paying.into_iter().flat_map(|o| o.items).collect();
                let total = cart::cart_total(&lines);
                let cart_json = encode_json("receipts.cart", &lines)?;

                sqlx::query(
                    r#"
                    UPDATE receipts
                    SET cart = ?1, total = ?2, state = 'pending payment',
                        orders_in_bill = ?3, last_updated = ?4, version = version + 1
                    WHERE receipt_num = ?5
                    "#,
                )
                .bind(&cart_json)
                .bind(total)
                .bind(orders_in_bill)
                .bind(Utc::now())
                .bind(target)
                .execute(&mut *tx)
                .await?;

                info!(
                    target,
                    sources = ?sources,
                    orders_moved = reassigned.rows_affected(),
                    total = %total,
                    "Receipts merged"
                );
                load_receipt(&mut *tx, target).await
            }
            .await;
            settle(tx, result, "merge").await
        })
        .await
    }

    /// Parks every pending bill at `till_num` that already holds a cart.
    ///
    /// Returns how many bills were suspended.
    pub async fn suspend(&self, till_num: i64) -> DbResult<u64> {
        validate_till(till_num)?;

        within("suspend", self.ledger.deadlines.short, async {
            let result = sqlx::query(
                r#"
                UPDATE receipts
                SET state = 'suspend', last_updated = ?1, version = version + 1
                WHERE till_num = ?2 AND state = 'pending'
                  AND cart IS NOT NULL AND cart != '[]'
                "#,
            )
            .bind(Utc::now())
            .bind(till_num)
            .execute(&self.pool)
            .await?;

            info!(till_num, suspended = result.rows_affected(), "Bills suspended");
            Ok(result.rows_affected())
        })
        .await
    }

    /// Clears the till for a fresh bill: like [`suspend`](Self::suspend), but
    /// also parks pending bills whose orders already carry lines.
    pub async fn new_bill(&self, till_num: i64) -> DbResult<u64> {
        validate_till(till_num)?;

        within("new_bill", self.ledger.deadlines.short, async {
            let result = sqlx::query(
                r#"
                UPDATE receipts
                SET state = 'suspend', last_updated = ?1, version = version + 1
                WHERE till_num = ?2 AND state = 'pending'
                  AND (
                    (cart IS NOT NULL AND cart != '[]')
                    OR EXISTS (
                        SELECT 1 FROM orders o
                        WHERE o.receipt_num = receipts.receipt_num
                          AND o.state NOT IN ('DELETED', 'VOIDED')
                          AND o.items != '[]'
                    )
                  )
                "#,
            )
            .bind(Utc::now())
            .bind(till_num)
            .execute(&self.pool)
            .await?;

            info!(till_num, suspended = result.rows_affected(), "New bill started");
            Ok(result.rows_affected())
        })
        .await
    }

    /// Reopens a closed, paying or suspended bill for more ringing.
    ///
    /// Paying orders return to dispatched in the same transaction. Resuming a
    /// bill that is already pending changes nothing.
    pub async fn resume(&self, receipt_num: i64) -> DbResult<ReceiptLog> {
        within("resume", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<ReceiptLog> = async {
                let reopened = sqlx::query(
                    r#"
                    UPDATE receipts
                    SET state = 'pending', last_updated = ?1, version = version + 1
                    WHERE receipt_num = ?2 AND state IN ('suspend', 'pending payment', 'paying')
                    "#,
                )
                .bind(Utc::now())
                .bind(receipt_num)
                .execute(&mut *tx)
                .await?;

                if reopened.rows_affected() == 0 {
                    match receipt_state(&mut tx, receipt_num).await? {
                        Some(ReceiptState::Pending) => {
                            debug!(receipt_num, "Receipt already pending");
                            return load_receipt(&mut *tx, receipt_num).await;
                        }
                        _ => return Err(explain_miss(&mut tx, receipt_num, "cannot resume").await),
                    }
                }

                let returned = sqlx::query(
                    r#"
                    UPDATE orders SET state = 'dispatched', version = version + 1
                    WHERE receipt_num = ?1 AND state = 'paying'
                    "#,
                )
                .bind(receipt_num)
                .execute(&mut *tx)
                .await?;

                info!(receipt_num, orders_returned = returned.rows_affected(), "Bill resumed");
                load_receipt(&mut *tx, receipt_num).await
            }
            .await;
            settle(tx, result, "resume").await
        })
        .await
    }

    /// Voids a receipt that has not been paid.
    pub async fn void(&self, receipt_num: i64) -> DbResult<VoidOutcome> {
        within("void", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let outcome = void_step(&mut conn, receipt_num).await?;
            info!(receipt_num, outcome = ?outcome, "Receipt voided");
            Ok(outcome)
        })
        .await
    }

    /// Voids a receipt and deletes all of its live orders, atomically.
    pub async fn del_cascade(&self, receipt_num: i64) -> DbResult<VoidOutcome> {
        within("del_cascade", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<VoidOutcome> = async {
                let outcome = void_step(&mut tx, receipt_num).await?;
                let deleted = sqlx::query(
                    r#"
                    UPDATE orders SET state = 'DELETED', version = version + 1
                    WHERE receipt_num = ?1 AND state NOT IN ('DELETED', 'VOIDED')
                    "#,
                )
                .bind(receipt_num)
                .execute(&mut *tx)
                .await?;

                info!(receipt_num, orders_deleted = deleted.rows_affected(), "Receipt cascaded");
                Ok(outcome)
            }
            .await;
            settle(tx, result, "del_cascade").await
        })
        .await
    }

    /// Checkout analytics for the live cart.
    pub async fn analyze(&self, receipt_num: i64) -> DbResult<Analysis> {
        let receipt = self.fetch(receipt_num).await?;
        Ok(cart::analyze(&receipt.cart, Utc::now()))
    }

    /// Stores checkout analytics and hands the bill to payment.
    pub async fn commit_sale(&self, receipt_num: i64) -> DbResult<ReceiptLog> {
        within("commit_sale", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let receipt = load_receipt(&mut *conn, receipt_num).await?;
            let analysis = cart::analyze(&receipt.cart, Utc::now());
            let total = cart::cart_total(&receipt.cart);

            let result = sqlx::query(
                r#"
                UPDATE receipts
                SET state = 'pending payment', total = ?1, analysis = ?2,
                    last_updated = ?3, version = version + 1
                WHERE receipt_num = ?4 AND version = ?5
                  AND state IN ('pending', 'pending payment')
                "#,
            )
            .bind(total)
            .bind(encode_json("receipts.analysis", &analysis)?)
            .bind(Utc::now())
            .bind(receipt_num)
            .bind(receipt.version)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(explain_miss(&mut conn, receipt_num, "cannot commit the sale").await);
            }
            load_receipt(&mut *conn, receipt_num).await
        })
        .await
    }

    /// Moves a closed bill into payment.
    pub async fn begin_payment(&self, receipt_num: i64) -> DbResult<ReceiptLog> {
        within("begin_payment", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let result = sqlx::query(
                r#"
                UPDATE receipts
                SET state = 'paying', last_updated = ?1, version = version + 1
                WHERE receipt_num = ?2 AND state = 'pending payment'
                "#,
            )
            .bind(Utc::now())
            .bind(receipt_num)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(explain_miss(&mut conn, receipt_num, "expected pending payment").await);
            }
            load_receipt(&mut *conn, receipt_num).await
        })
        .await
    }

    /// Settles a bill.
    ///
    /// ## What This Does (one transaction)
    /// 1. Checks the tender covers the live total for cash outcomes
    /// 2. Gives change out of cash; stored cash is net of change
    /// 3. Receipt → `tender.outcome`
    /// 4. Lines of every paying order are written to the sales ledger
    pub async fn post_payment(&self, receipt_num: i64, tender: &Tender) -> DbResult<ReceiptLog> {
        if !tender.outcome.is_payment_terminal() {
            return Err(ValidationError::NotAllowed {
                field: "outcome".to_string(),
                allowed: ReceiptState::PAYMENT_TERMINAL
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            }
            .into());
        }
        validate_till(tender.pay_till)?;

        within("post_payment", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<ReceiptLog> = async {
                let receipt = load_receipt(&mut *tx, receipt_num).await?;
                if !matches!(receipt.state, ReceiptState::PendingPayment | ReceiptState::Paying) {
                    return Err(DbError::conflict(
                        "Receipt",
                        receipt_num,
                        format!("cannot take payment on a {} receipt", receipt.state.as_str()),
                    ));
                }

                let total = cart::cart_total(&receipt.cart);
                let tendered = tender.pay_details.tendered();
                let cash_outcome = matches!(tender.outcome, ReceiptState::Posted | ReceiptState::Paid);
                if cash_outcome && tendered < total {
                    return Err(ValidationError::OutOfRange {
                        field: "tendered".to_string(),
                        min: total.cents(),
                        max: i64::MAX,
                    }
                    .into());
                }

                let change = if tendered > total { tendered - total } else { Money::zero() };
                if change > tender.pay_details.cash {
                    return Err(ValidationError::InvalidFormat {
                        field: "pay_details".to_string(),
                        reason: "change can only be given out of cash".to_string(),
                    }
                    .into());
                }

                let mut applied = tender.pay_details;
                applied.cash -= change;

                let updated = sqlx::query(
                    r#"
                    UPDATE receipts
                    SET state = ?1, pay_details = ?2, cash = ?3, change_due = ?4,
                        pay_till = ?5, approver = ?6, total = ?7, last_updated = ?8,
                        version = version + 1
                    WHERE receipt_num = ?9 AND version = ?10
                    "#,
                )
                .bind(tender.outcome)
                .bind(encode_json("receipts.pay_details", &applied)?)
                .bind(tender.pay_details.cash)
                .bind(change)
                .bind(tender.pay_till)
                .bind(&tender.approver)
                .bind(total)
                .bind(Utc::now())
                .bind(receipt_num)
                .bind(receipt.version)
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(explain_miss(&mut tx, receipt_num, "modified concurrently").await);
                }

                let paying = orders_of_receipt(&mut tx, receipt_num, &[OrderState::Paying]).await?;
                if paying.is_empty() {
                    warn!(receipt_num, "Payment posted without paying orders");
                }
                let mut written = 0;
                for order in &paying {
                    written += ledger::record_lines(
                        &mut tx,
                        receipt_num,
                        receipt.sale_type,
                        tender.outcome.as_str(),
                        &order.items,
                    )
                    .await?;
                }

                info!(
                    receipt_num,
                    outcome = tender.outcome.as_str(),
                    total = %total,
                    change = %change,
                    ledger_lines = written,
                    "Payment posted"
                );
                load_receipt(&mut *tx, receipt_num).await
            }
            .await;
            settle(tx, result, "post_payment").await
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
