//! # Order Repository
//!
//! The Order Engine: tickets of line items hung off a receipt.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── new_order() → reuses the till's pending order for the receipt  │
//! │                       or allocates YYYYMMDD‖company‖branch‖count‖0     │
//! │                                                                         │
//! │  2. FILL                                                               │
//! │     └── add_to_order() → item key "{order}-{n}", total re-derived     │
//! │     └── del_order_item() → item soft-deleted, total re-derived        │
//! │                                                                         │
//! │  3. COMPLETE                                                           │
//! │     └── complete_order() → dispatched (or ordered with production     │
//! │                             dispatch), voucher lines returned          │
//! │                                                                         │
//! │  4. BILL                                                               │
//! │     └── receipts close_bill / merge → paying                           │
//! │     └── set_order_pay() → paying + lines copied to the sales ledger    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every write to `items` is guarded by the row `version`, so two tills
//! editing the same order cannot overwrite each other's lines.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use kassa_core::cart::{self, DeleteOutcome};
use kassa_core::numbering;
use kassa_core::validation::{validate_person, validate_quantity, validate_till};
use kassa_core::{
    CoreError, LineItem, Money, Order, OrderState, OrderSummary, Poster, ValidationError,
    VoucherLine,
};

use super::{decode_json, encode_json, ledger};
use crate::coordinator::{business_day, retry_on_conflict, settle, within, LedgerOptions};
use crate::error::{DbError, DbResult};

const ORDER_SELECT: &str = r#"
    SELECT order_num, daily_count, trans_date, complete_time, items, poster,
           branch, company_id, till_num, pay_till, receipt_num, ac_num,
           state, disp_by, disp_time, version
    FROM orders
"#;

/// States an order can be in while it still belongs to a live bill.
const ACTIVE_STATES: &str = "('pending', 'ordered', 'dispatched', 'paying')";

#[derive(Debug, FromRow)]
struct OrderRow {
    order_num: i64,
    daily_count: i64,
    trans_date: DateTime<Utc>,
    complete_time: Option<DateTime<Utc>>,
    items: String,
    poster: String,
    branch: String,
    company_id: i64,
    till_num: i64,
    pay_till: i64,
    receipt_num: i64,
    ac_num: String,
    state: OrderState,
    disp_by: Option<String>,
    disp_time: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> DbResult<Order> {
        Ok(Order {
            order_num: row.order_num,
            daily_count: row.daily_count,
            trans_date: row.trans_date,
            complete_time: row.complete_time,
            items: decode_json("orders.items", &row.items)?,
            poster: row.poster,
            branch: row.branch,
            company_id: row.company_id,
            till_num: row.till_num,
            pay_till: row.pay_till,
            receipt_num: row.receipt_num,
            ac_num: row.ac_num,
            state: row.state,
            disp_by: row.disp_by,
            disp_time: row.disp_time,
            version: row.version,
        })
    }
}

fn summary_of(order: &Order) -> OrderSummary {
    OrderSummary {
        order_num: order.order_num,
        receipt_num: order.receipt_num,
        poster: order.poster.clone(),
        state: order.state,
        trans_date: order.trans_date,
        total: order.total(),
    }
}

// =============================================================================
// Shared Steps
// =============================================================================

/// Loads one order through any executor (pool or open transaction).
pub(crate) async fn load_order<'e, E>(executor: E, order_num: i64) -> DbResult<Order>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE order_num = ?1", ORDER_SELECT);
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(order_num)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DbError::not_found("Order", order_num))?;

    row.try_into()
}

/// Orders of `receipt_num` in `state`, oldest first.
pub(crate) async fn orders_of_receipt(
    conn: &mut SqliteConnection,
    receipt_num: i64,
    states: &[OrderState],
) -> DbResult<Vec<Order>> {
    let mut builder = sqlx::QueryBuilder::<Sqlite>::new(ORDER_SELECT);
    builder.push(" WHERE receipt_num = ");
    builder.push_bind(receipt_num);
    builder.push(" AND state IN (");
    let mut separated = builder.separated(", ");
    for state in states {
        separated.push_bind(*state);
    }
    separated.push_unseparated(") ORDER BY trans_date, order_num");

    let rows = builder
        .build_query_as::<OrderRow>()
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(Order::try_from).collect()
}

/// Turns a guarded UPDATE that matched nothing into NotFound or Conflict.
async fn explain_miss(conn: &mut SqliteConnection, order_num: i64, expected: &str) -> DbError {
    let current: Result<Option<(OrderState, i64)>, sqlx::Error> =
        sqlx::query_as("SELECT state, version FROM orders WHERE order_num = ?1")
            .bind(order_num)
            .fetch_optional(&mut *conn)
            .await;

    match current {
        Ok(None) => DbError::not_found("Order", order_num),
        Ok(Some((state, _))) if state.as_str() != expected => DbError::conflict(
            "Order",
            order_num,
            format!("order is {}, expected {}", state.as_str(), expected),
        ),
        Ok(Some(_)) => DbError::conflict("Order", order_num, "modified concurrently"),
        Err(e) => e.into(),
    }
}

/// Writes `items` back to a pending order, checking it was not changed since
/// `version` was read.
async fn write_items(
    conn: &mut SqliteConnection,
    order_num: i64,
    items: &[LineItem],
    version: i64,
) -> DbResult<()> {
    let items_json = encode_json("orders.items", &items)?;

    let result = sqlx::query(
        r#"
        UPDATE orders
        SET items = ?1, version = version + 1
        WHERE order_num = ?2 AND version = ?3 AND state = 'pending'
        "#,
    )
    .bind(&items_json)
    .bind(order_num)
    .bind(version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(explain_miss(conn, order_num, OrderState::Pending.as_str()).await);
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the Order Engine.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    ledger: LedgerOptions,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool, ledger: LedgerOptions) -> Self {
        OrderRepository { pool, ledger }
    }

    /// The highest pending order this poster's till holds for `receipt_num`.
    pub async fn next_order(&self, poster: &Poster, receipt_num: i64) -> DbResult<Option<i64>> {
        within("next_order", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            pending_order_for(&mut conn, poster.till_num, receipt_num).await
        })
        .await
    }

    /// Returns the pending order for (till, receipt), creating one if none.
    ///
    /// ## Arguments
    /// * `poster` - Who is ringing up, and at which till
    /// * `receipt_num` - Bill the order belongs to
    /// * `ac_num` - Customer account; defaults to the receipt number
    pub async fn new_order(
        &self,
        poster: &Poster,
        receipt_num: i64,
        ac_num: Option<&str>,
    ) -> DbResult<i64> {
        validate_person("poster", &poster.username)?;
        validate_till(poster.till_num)?;

        retry_on_conflict("new_order", move || {
            self.try_new_order(poster, receipt_num, ac_num)
        })
        .await
    }

    async fn try_new_order(
        &self,
        poster: &Poster,
        receipt_num: i64,
        ac_num: Option<&str>,
    ) -> DbResult<i64> {
        within("new_order", self.ledger.deadlines.short, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<i64> = async {
                if let Some(existing) = pending_order_for(&mut tx, poster.till_num, receipt_num).await? {
                    debug!(order_num = existing, receipt_num, "Reusing pending order");
                    return Ok(existing);
                }

                let now = Utc::now();
                let day = business_day(now);

                // The branch's day occupies one contiguous block of order numbers.
                let first = numbering::order_number(day, poster.company_id, poster.branch_id, 1)?;
                let last = numbering::order_number(
                    day,
                    poster.company_id,
                    poster.branch_id,
                    numbering::MAX_DAILY_ORDERS,
                )?;
                let daily_count: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COALESCE(MAX(daily_count), 0) + 1
                    FROM orders
                    WHERE order_num BETWEEN ?1 AND ?2
                    "#,
                )
                .bind(first)
                .bind(last)
                .fetch_one(&mut *tx)
                .await?;

                let order_num =
                    numbering::order_number(day, poster.company_id, poster.branch_id, daily_count)?;
                let ac_num = ac_num
                    .map(str::to_string)
                    .unwrap_or_else(|| receipt_num.to_string());

                sqlx::query(
                    r#"
                    INSERT INTO orders (
                        order_num, daily_count, trans_day, trans_date, items,
                        poster, branch, company_id, till_num, receipt_num,
                        ac_num, state
                    ) VALUES (?1, ?2, ?3, ?4, '[]', ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                )
                .bind(order_num)
                .bind(daily_count)
                .bind(day)
                .bind(now)
                .bind(&poster.username)
                .bind(&poster.branch)
                .bind(poster.company_id)
                .bind(poster.till_num)
                .bind(receipt_num)
                .bind(&ac_num)
                .bind(OrderState::Pending)
                .execute(&mut *tx)
                .await?;

                info!(order_num, receipt_num, till_num = poster.till_num, "Order opened");
                Ok(order_num)
            }
            .await;
            settle(tx, result, "new_order").await
        })
        .await
    }

    /// Loads an order with all of its lines.
    pub async fn fetch(&self, order_num: i64) -> DbResult<Order> {
        within("fetch_order", self.ledger.deadlines.short, async {
            load_order(&self.pool, order_num).await
        })
        .await
    }

    /// The lines of an order, deleted ones included.
    pub async fn fetch_items(&self, order_num: i64) -> DbResult<Vec<LineItem>> {
        Ok(self.fetch(order_num).await?.items)
    }

    /// Appends a line to a pending order.
    ///
    /// The line is stamped with the order and receipt numbers and keyed
    /// `"{order_num}-{n}"`. Returns the updated lines and the re-derived total.
    pub async fn add_to_order(&self, order_num: i64, item: LineItem) -> DbResult<(Vec<LineItem>, Money)> {
        if item.item_code.trim().is_empty() {
            return Err(ValidationError::required("item_code").into());
        }
        validate_quantity(item.quantity)?;

        within("add_to_order", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let order = load_order(&mut *conn, order_num).await?;

            if order.receipt_num == 0 {
                return Err(ValidationError::required("receipt_num").into());
            }

            let mut item = item;
            item.order_num = order_num;
            item.receipt_num = order.receipt_num;
            if item.till_num == 0 {
                item.till_num = order.till_num;
            }
            item.receipt_item = cart::next_item_key(order_num, &order.items);

            let mut items = order.items;
            debug!(order_num, key = %item.receipt_item, code = %item.item_code, "Adding line");
            items.push(item);

            write_items(&mut conn, order_num, &items, order.version).await?;

            let total = cart::cart_total(&items);
            Ok((items, total))
        })
        .await
    }

    /// Soft-deletes the line keyed `key`.
    ///
    /// Deleting a line that is already deleted succeeds without a write.
    pub async fn del_order_item(&self, key: &str, order_num: i64) -> DbResult<(Vec<LineItem>, Money)> {
        within("del_order_item", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let mut order = load_order(&mut *conn, order_num).await?;

            match cart::soft_delete(&mut order.items, key) {
                DeleteOutcome::Missing => return Err(DbError::not_found("Order item", key)),
                DeleteOutcome::AlreadyRemoved => {
                    debug!(order_num, key, "Line already deleted");
                }
                DeleteOutcome::Deleted => {
                    if order.state != OrderState::Pending {
                        return Err(DbError::conflict(
                            "Order",
                            order_num,
                            format!("cannot delete lines of a {} order", order.state.as_str()),
                        ));
                    }
                    write_items(&mut conn, order_num, &order.items, order.version).await?;
                    info!(order_num, key, "Line deleted");
                }
            }

            let total = cart::cart_total(&order.items);
            Ok((order.items, total))
        })
        .await
    }

    /// Completes a pending order and returns its voucher.
    ///
    /// ## Errors
    /// * `CoreError::EmptyOrder` - no live lines to complete
    /// * `DbError::Conflict` - order is not pending, or changed meanwhile
    pub async fn complete_order(&self, order_num: i64) -> DbResult<Vec<VoucherLine>> {
        let next_state = if self.ledger.production_dispatch {
            OrderState::Ordered
        } else {
            OrderState::Dispatched
        };

        within("complete_order", self.ledger.deadlines.short, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<Vec<VoucherLine>> = async {
                let order = load_order(&mut *tx, order_num).await?;

                if !order.items.iter().any(LineItem::is_pending) {
                    return Err(CoreError::EmptyOrder(order_num).into());
                }

                let updated = sqlx::query(
                    r#"
                    UPDATE orders
                    SET state = ?1, complete_time = ?2, version = version + 1
                    WHERE order_num = ?3 AND state = 'pending' AND version = ?4
                    "#,
                )
                .bind(next_state)
                .bind(Utc::now())
                .bind(order_num)
                .bind(order.version)
                .execute(&mut *tx)
                .await?;

                if updated.rows_affected() == 0 {
                    return Err(explain_miss(&mut tx, order_num, OrderState::Pending.as_str()).await);
                }

                info!(order_num, state = next_state.as_str(), total = %order.total(), "Order completed");
                Ok(cart::voucher(&order))
            }
            .await;
            settle(tx, result, "complete_order").await
        })
        .await
    }

    /// Releases an `ordered` order from production.
    pub async fn dispatch_order(&self, order_num: i64, dispatcher: &str) -> DbResult<Order> {
        validate_person("dispatcher", dispatcher)?;

        within("dispatch_order", self.ledger.deadlines.short, async {
            let mut conn = self.pool.acquire().await?;
            let result = sqlx::query(
                r#"
                UPDATE orders
                SET state = 'dispatched', disp_by = ?1, disp_time = ?2, version = version + 1
                WHERE order_num = ?3 AND state = 'ordered'
                "#,
            )
            .bind(dispatcher)
            .bind(Utc::now())
            .bind(order_num)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(explain_miss(&mut conn, order_num, OrderState::Ordered.as_str()).await);
            }

            info!(order_num, dispatcher, "Order dispatched");
            load_order(&mut *conn, order_num).await
        })
        .await
    }

    /// Marks a dispatched order paying under `receipt_num` and copies its
    /// lines into the sales ledger, in one transaction.
    pub async fn set_order_pay(&self, order_num: i64, receipt_num: i64) -> DbResult<()> {
        within("set_order_pay", self.ledger.deadlines.long, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<()> = async {
                let order = load_order(&mut *tx, order_num).await?;
                if !matches!(order.state, OrderState::Dispatched | OrderState::Paying) {
                    return Err(DbError::conflict(
                        "Order",
                        order_num,
                        format!("order is {}, expected dispatched", order.state.as_str()),
                    ));
                }

                let sale_type = order
                    .items
                    .first()
                    .map(|i| i.sale_type)
                    .unwrap_or_default();
                ledger::record_lines(
                    &mut tx,
                    receipt_num,
                    sale_type,
                    OrderState::Paying.as_str(),
                    &order.items,
                )
                .await?;

                sqlx::query(
                    r#"
                    UPDATE orders
                    SET state = 'paying', receipt_num = ?1, version = version + 1
                    WHERE order_num = ?2
                    "#,
                )
                .bind(receipt_num)
                .bind(order_num)
                .execute(&mut *tx)
                .await?;

                Ok(())
            }
            .await;
            settle(tx, result, "set_order_pay").await
        })
        .await
    }

    /// Live orders rung up at `till_num`.
    pub async fn active_orders(&self, till_num: i64) -> DbResult<Vec<OrderSummary>> {
        validate_till(till_num)?;
        let sql = format!(
            "{} WHERE till_num = ?1 AND state IN {} ORDER BY trans_date, order_num",
            ORDER_SELECT, ACTIVE_STATES
        );
        self.summaries("active_orders", &sql, till_num).await
    }

    /// Live orders hung off `receipt_num`.
    pub async fn active_orders_in_bill(&self, receipt_num: i64) -> DbResult<Vec<OrderSummary>> {
        let sql = format!(
            "{} WHERE receipt_num = ?1 AND state IN {} ORDER BY trans_date, order_num",
            ORDER_SELECT, ACTIVE_STATES
        );
        self.summaries("active_orders_in_bill", &sql, receipt_num).await
    }

    async fn summaries(&self, operation: &'static str, sql: &str, key: i64) -> DbResult<Vec<OrderSummary>> {
        within(operation, self.ledger.deadlines.short, async {
            let rows = sqlx::query_as::<_, OrderRow>(sql)
                .bind(key)
                .fetch_all(&self.pool)
                .await?;

            rows.into_iter()
                .map(|row| Order::try_from(row).map(|order| summary_of(&order)))
                .collect()
        })
        .await
    }

    /// Live lines of every paying order at `till_num`.
    pub async fn paying_items(&self, till_num: i64) -> DbResult<Vec<LineItem>> {
        validate_till(till_num)?;

        within("paying_items", self.ledger.deadlines.short, async {
            let sql = format!("{} WHERE till_num = ?1 AND state = 'paying' ORDER BY order_num", ORDER_SELECT);
            let rows = sqlx::query_as::<_, OrderRow>(&sql)
                .bind(till_num)
                .fetch_all(&self.pool)
                .await?;

            let mut items = Vec::new();
            for row in rows {
                let order = Order::try_from(row)?;
                items.extend(cart::pending_items(&order.items));
            }
            Ok(items)
        })
        .await
    }

    /// Only pending orders may lose lines or be discarded by the cashier.
    pub async fn is_deletable(&self, order_num: i64) -> DbResult<bool> {
        Ok(self.fetch(order_num).await?.state == OrderState::Pending)
    }

    /// Printable lines of an order, grouped by name and price.
    pub async fn voucher(&self, order_num: i64) -> DbResult<Vec<VoucherLine>> {
        Ok(cart::voucher(&self.fetch(order_num).await?))
    }

    /// Re-homes a not-yet-billed order onto another open receipt.
    pub async fn move_to_receipt(&self, order_num: i64, receipt_num: i64) -> DbResult<Order> {
        within("move_to_receipt", self.ledger.deadlines.short, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<Order> = async {
                let open: Option<i64> = sqlx::query_scalar(
                    r#"
                    SELECT receipt_num FROM receipts
                    WHERE receipt_num = ?1 AND state IN ('pending', 'pending payment', 'paying')
                    "#,
                )
                .bind(receipt_num)
                .fetch_optional(&mut *tx)
                .await?;
                if open.is_none() {
                    return Err(DbError::not_found("Open receipt", receipt_num));
                }

                let moved = sqlx::query(
                    r#"
                    UPDATE orders
                    SET receipt_num = ?1, ac_num = ?2, version = version + 1
                    WHERE order_num = ?3 AND state IN ('pending', 'ordered', 'dispatched')
                    "#,
                )
                .bind(receipt_num)
                .bind(receipt_num.to_string())
                .bind(order_num)
                .execute(&mut *tx)
                .await?;

                if moved.rows_affected() == 0 {
                    return Err(explain_miss(&mut tx, order_num, "not yet billed").await);
                }

                info!(order_num, receipt_num, "Order moved");
                load_order(&mut *tx, order_num).await
            }
            .await;
            settle(tx, result, "move_to_receipt").await
        })
        .await
    }
}

async fn pending_order_for(
    conn: &mut SqliteConnection,
    till_num: i64,
    receipt_num: i64,
) -> DbResult<Option<i64>> {
    let order_num: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(order_num) FROM orders
        WHERE state = 'pending' AND till_num = ?1 AND receipt_num = ?2
        "#,
    )
    .bind(till_num)
    .bind(receipt_num)
    .fetch_one(&mut *conn)
    .await?;

    Ok(order_num)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{database, line, poster};
    use kassa_core::{ItemState, SaleType};

    async fn open_receipt(db: &crate::Database) -> i64 {
        db.receipts()
            .gen_receipt(&poster(7), SaleType::CashSale)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_order_reuses_pending_order() {
        let db = database().await;
        let receipt = open_receipt(&db).await;
        let orders = db.orders();

        let first = orders.new_order(&poster(7), receipt, None).await.unwrap();
        let second = orders.new_order(&poster(7), receipt, None).await.unwrap();
        assert_eq!(first, second);

        let order = orders.fetch(first).await.unwrap();
        assert_eq!(order.state, OrderState::Pending);
        assert_eq!(order.ac_num, receipt.to_string());
        assert_eq!(order.daily_count, 1);
        assert!(first.to_string().ends_with("00100200010"), "{}", first);
    }

    #[tokio::test]
    async fn test_new_order_requires_till() {
        let db = database().await;
        let err = db.orders().new_order(&poster(0), 1, None).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_add_to_order_keys_lines_and_totals() {
        let db = database().await;
        let receipt = open_receipt(&db).await;
        let orders = db.orders();
        let order_num = orders.new_order(&poster(7), receipt, None).await.unwrap();

        orders.add_to_order(order_num, line("SKU1", 5000, 2.0)).await.unwrap();
        let (items, total) = orders.add_to_order(order_num, line("SKU2", 250, 1.0)).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].receipt_item, format!("{}-1", order_num));
        assert_eq!(items[1].receipt_item, format!("{}-2", order_num));
        assert_eq!(items[1].receipt_num, receipt);
        assert_eq!(total.cents(), 10250);
    }

    #[tokio::test]
    async fn test_add_to_order_rejects_bad_quantity() {
        let db = database().await;
        let receipt = open_receipt(&db).await;
        let order_num = db.orders().new_order(&poster(7), receipt, None).await.unwrap();

        let err = db
            .orders()
            .add_to_order(order_num, line("SKU1", 5000, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_del_order_item_soft_deletes() {
        let db = database().await;
        let receipt = open_receipt(&db).await;
        let orders = db.orders();
        let order_num = orders.new_order(&poster(7), receipt, None).await.unwrap();
        orders.add_to_order(order_num, line("SKU1", 5000, 2.0)).await.unwrap();
        orders.add_to_order(order_num, line("SKU2", 250, 1.0)).await.unwrap();

        let key = format!("{}-1", order_num);
        let (items, total) = orders.del_order_item(&key, order_num).await.unwrap();
        assert_eq!(items[0].state, ItemState::Deleted);
        assert_eq!(total.cents(), 250);

        // second delete is a quiet success
        let (_, again) = orders.del_order_item(&key, order_num).await.unwrap();
        assert_eq!(again.cents(), 250);

        let err = orders.del_order_item("nope", order_num).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_complete_order_rejects_empty_order() {
        let db = database().await;
        let receipt = open_receipt(&db).await;
        let order_num = db.orders().new_order(&poster(7), receipt, None).await.unwrap();

        let err = db.orders().complete_order(order_num).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::EmptyOrder(n)) if n == order_num));
    }

    #[tokio::test]
    async fn test_complete_order_dispatches_and_locks_lines() {
        let db = database().await;
        let receipt = open_receipt(&db).await;
        let orders = db.orders();
        let order_num = orders.new_order(&poster(7), receipt, None).await.unwrap();
        orders.add_to_order(order_num, line("SKU1", 5000, 2.0)).await.unwrap();

        let voucher = orders.complete_order(order_num).await.unwrap();
        assert_eq!(voucher.len(), 1);
        assert_eq!(voucher[0].total.cents(), 10000);

        let order = orders.fetch(order_num).await.unwrap();
        assert_eq!(order.state, OrderState::Dispatched);
        assert!(order.complete_time.is_some());
        assert!(!orders.is_deletable(order_num).await.unwrap());

        let err = orders
            .add_to_order(order_num, line("SKU2", 100, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let key = format!("{}-1", order_num);
        let err = orders.del_order_item(&key, order_num).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_production_dispatch_holds_orders() {
        let db = crate::Database::new(crate::DbConfig::in_memory().production_dispatch(true))
            .await
            .unwrap();
        let receipt = open_receipt(&db).await;
        let orders = db.orders();
        let order_num = orders.new_order(&poster(7), receipt, None).await.unwrap();
        orders.add_to_order(order_num, line("SKU1", 5000, 1.0)).await.unwrap();

        orders.complete_order(order_num).await.unwrap();
        assert_eq!(orders.fetch(order_num).await.unwrap().state, OrderState::Ordered);

        let order = orders.dispatch_order(order_num, "kitchen").await.unwrap();
        assert_eq!(order.state, OrderState::Dispatched);
        assert_eq!(order.disp_by.as_deref(), Some("kitchen"));

        let err = orders.dispatch_order(order_num, "kitchen").await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_set_order_pay_copies_lines_once() {
        let db = database().await;
        let receipt = open_receipt(&db).await;
        let orders = db.orders();
        let order_num = orders.new_order(&poster(7), receipt, None).await.unwrap();
        orders.add_to_order(order_num, line("SKU1", 5000, 2.0)).await.unwrap();
        orders.complete_order(order_num).await.unwrap();

        orders.set_order_pay(order_num, receipt).await.unwrap();
        orders.set_order_pay(order_num, receipt).await.unwrap();

        let lines = db.receipts().ledger_lines(receipt).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(orders.fetch(order_num).await.unwrap().state, OrderState::Paying);
        assert_eq!(orders.paying_items(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_active_orders_and_move() {
        let db = database().await;
        let first = open_receipt(&db).await;
        let second = db.receipts().create_receipt(&poster(7), SaleType::CashSale).await.unwrap();
        let orders = db.orders();
        let order_num = orders.new_order(&poster(7), first, None).await.unwrap();

        orders.add_to_order(order_num, line("SKU1", 5000, 2.0)).await.unwrap();

        assert_eq!(orders.active_orders(7).await.unwrap().len(), 1);
        let summaries = orders.active_orders_in_bill(first).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].order_num, order_num);
        assert_eq!(summaries[0].receipt_num, first);
        assert_eq!(summaries[0].poster, "amina");
        assert_eq!(summaries[0].state, OrderState::Pending);
        assert_eq!(summaries[0].total, Money::from_cents(10000));

        let moved = orders.move_to_receipt(order_num, second).await.unwrap();
        assert_eq!(moved.receipt_num, second);
        assert!(orders.active_orders_in_bill(first).await.unwrap().is_empty());

        let err = orders.move_to_receipt(order_num, 42).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
