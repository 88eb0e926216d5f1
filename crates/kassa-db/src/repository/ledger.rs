//! # Sales Ledger
//!
//! One row per billed line, keyed by the line's `receipt_item`. Rows are
//! written by the payment steps of the order and receipt repositories and
//! never updated; writing the same line twice is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqliteConnection};
use tracing::{debug, warn};

use kassa_core::{LineItem, Money, SaleType};

use crate::error::DbResult;

/// A persisted sales ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LedgerLine {
    pub receipt_item: String,
    pub trans_date: DateTime<Utc>,
    pub receipt_num: i64,
    pub order_num: i64,
    pub item_code: String,
    pub item_name: String,
    pub quantity: f64,
    pub price: Money,
    pub discount: Money,
    pub vat: Money,
    pub served_by: String,
    pub till_num: i64,
    pub sale_type: SaleType,
    pub state: String,
}

/// Copies the pending lines of `items` into the ledger under `receipt_num`.
///
/// Returns how many rows were new.
pub(crate) async fn record_lines(
    conn: &mut SqliteConnection,
    receipt_num: i64,
    sale_type: SaleType,
    state: &str,
    items: &[LineItem],
) -> DbResult<u64> {
    let mut written = 0;

    for item in items.iter().filter(|i| i.is_pending()) {
        if item.receipt_item.is_empty() {
            warn!(receipt_num, item_code = %item.item_code, "Skipping ledger line without key");
            continue;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO sales_ledger (
                receipt_item, trans_date, receipt_num, order_num,
                item_code, item_name, quantity, cost, price, discount,
                vat_alpha, vat_perc, vat, served_by, branch, till_num,
                company_id, sale_type, approved_by, state
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20
            )
            ON CONFLICT (receipt_item) DO NOTHING
            "#,
        )
        .bind(&item.receipt_item)
        .bind(item.trans_date)
        .bind(receipt_num)
        .bind(item.order_num)
        .bind(&item.item_code)
        .bind(&item.item_name)
        .bind(item.quantity)
        .bind(item.cost)
        .bind(item.price)
        .bind(item.discount)
        .bind(&item.vat_alpha)
        .bind(item.vat_perc)
        .bind(item.vat)
        .bind(&item.served_by)
        .bind(&item.branch)
        .bind(item.till_num)
        .bind(item.company_id)
        .bind(sale_type)
        .bind(&item.approved_by)
        .bind(state)
        .execute(&mut *conn)
        .await?;

        written += result.rows_affected();
    }

    debug!(receipt_num, written, "Ledger lines recorded");
    Ok(written)
}

/// Ledger rows billed under `receipt_num`, in insertion order.
pub(crate) async fn lines_for_receipt<'e, E>(executor: E, receipt_num: i64) -> DbResult<Vec<LedgerLine>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let lines = sqlx::query_as::<_, LedgerLine>(
        r#"
        SELECT receipt_item, trans_date, receipt_num, order_num, item_code,
               item_name, quantity, price, discount, vat, served_by,
               till_num, sale_type, state
        FROM sales_ledger
        WHERE receipt_num = ?1
        ORDER BY txn_id
        "#,
    )
    .bind(receipt_num)
    .fetch_all(executor)
    .await?;

    Ok(lines)
}
