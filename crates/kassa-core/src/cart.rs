//! # Cart Math
//!
//! Pure functions over a list of [`LineItem`]s: totals, item keys, soft
//! deletion, voucher grouping and checkout analysis.
//!
//! ## The Total Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total = Σ price × quantity   over items whose state is "pending"      │
//! │                                                                         │
//! │  [SKU1 ×2 @50.00 pending]   ──► 100.00                                  │
//! │  [SKU2 ×1 @20.00 DELETED]   ──►   0.00  (kept for audit)                │
//! │  [SKU3 ×1 @10.00 VOIDED ]   ──►   0.00  (kept for audit)                │
//! │                                ───────                                  │
//! │                                 100.00                                  │
//! │                                                                         │
//! │  Every write re-derives the total with this rule; a stored total is   │
//! │  never trusted on its own.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};

use crate::identity::Poster;
use crate::money::Money;
use crate::ports::CatalogItem;
use crate::types::{Analysis, ItemState, LineItem, Order, SaleType, VoucherLine};

/// Sum of `price × quantity` over pending items.
pub fn cart_total(items: &[LineItem]) -> Money {
    items
        .iter()
        .filter(|item| item.is_pending())
        .map(LineItem::line_total)
        .sum()
}

/// Clones only the pending items, in cart order.
pub fn pending_items(items: &[LineItem]) -> Vec<LineItem> {
    items.iter().filter(|item| item.is_pending()).cloned().collect()
}

/// Key for the next line appended to an order: `"{order_num}-{len + 1}"`.
///
/// Items are only ever soft-deleted, so the cart length grows monotonically
/// and keys are never reused within an order.
pub fn next_item_key(order_num: i64, items: &[LineItem]) -> String {
    format!("{}-{}", order_num, items.len() + 1)
}

/// Result of a soft delete against a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The item was pending and is now `DELETED`.
    Deleted,
    /// The item was already deleted or voided; nothing changed.
    AlreadyRemoved,
    /// No item carries that key.
    Missing,
}

/// Marks the item with `key` as `DELETED` if it is still pending.
pub fn soft_delete(items: &mut [LineItem], key: &str) -> DeleteOutcome {
    match items.iter_mut().find(|item| item.receipt_item == key) {
        Some(item) if item.is_pending() => {
            item.state = ItemState::Deleted;
            DeleteOutcome::Deleted
        }
        Some(_) => DeleteOutcome::AlreadyRemoved,
        None => DeleteOutcome::Missing,
    }
}

/// Groups an order's pending items by name and price for the printed voucher.
///
/// Rows keep the position of the first scan of each group.
pub fn voucher(order: &Order) -> Vec<VoucherLine> {
    let txn_time = order.trans_date.format("%Y-%m-%d %H:%M").to_string();
    let mut lines: Vec<VoucherLine> = Vec::new();

    for item in order.items.iter().filter(|item| item.is_pending()) {
        match lines
            .iter_mut()
            .find(|line| line.item_name == item.item_name && line.price == item.price)
        {
            Some(line) => {
                line.quantity += item.quantity;
                line.total += item.line_total();
            }
            None => lines.push(VoucherLine {
                item_name: item.item_name.clone(),
                quantity: item.quantity,
                price: item.price,
                total: item.line_total(),
                order_num: order.order_num,
                poster: order.poster.clone(),
                txn_time: txn_time.clone(),
            }),
        }
    }

    lines
}

/// Checkout metrics for a cart as of `now`.
///
/// Only pending items count. An empty cart, or a cart whose scans all share
/// one timestamp, has a scan rate of zero rather than a division by zero.
///
/// ## Example
/// ```rust
/// use kassa_core::cart::analyze;
/// use chrono::Utc;
///
/// let metrics = analyze(&[], Utc::now());
/// assert_eq!(metrics.scan_rate, 0.0);
/// ```
pub fn analyze(cart: &[LineItem], now: DateTime<Utc>) -> Analysis {
    let scanned = cart.iter().filter(|item| item.is_pending());

    let mut first: Option<DateTime<Utc>> = None;
    let mut last: Option<DateTime<Utc>> = None;
    let mut products_sold = 0.0;

    for item in scanned {
        products_sold += item.quantity;
        first = Some(first.map_or(item.trans_date, |t| t.min(item.trans_date)));
        last = Some(last.map_or(item.trans_date, |t| t.max(item.trans_date)));
    }

    let (Some(first), Some(last)) = (first, last) else {
        return Analysis::default();
    };

    let scan_span = seconds_between(first, last);
    let scan_rate = if scan_span > 0.0 && products_sold > 0.0 {
        scan_span / products_sold
    } else {
        0.0
    };

    Analysis {
        scan_rate,
        pay_time: seconds_between(last, now).max(0.0),
        time_on_sale: seconds_between(first, now).max(0.0),
        products_sold,
    }
}

/// Snapshots a catalog entry into a fresh pending line.
///
/// Order number, receipt number and key are filled in when the line is
/// appended to an order. VAT is tax-inclusive: `total × p / (100 + p)`.
pub fn scan(poster: &Poster, product: &CatalogItem, quantity: f64, now: DateTime<Utc>) -> LineItem {
    let line_total = product.till_price.times(quantity);
    let vat = if product.vat_percent > 0.0 {
        line_total.times(product.vat_percent / (100.0 + product.vat_percent))
    } else {
        Money::zero()
    };

    LineItem {
        trans_date: now,
        order_num: 0,
        receipt_num: 0,
        till_num: poster.till_num,
        served_by: poster.username.clone(),
        branch: poster.branch.clone(),
        company_id: poster.company_id,
        item_code: product.item_code.clone(),
        item_name: product.item_name.clone(),
        quantity,
        cost: product.item_cost,
        price: product.till_price,
        discount: Money::zero(),
        vat_alpha: product.vat_alpha.clone(),
        vat_perc: product.vat_percent,
        vat,
        sale_type: SaleType::CashSale,
        receipt_item: String::new(),
        approved_by: String::new(),
        state: ItemState::Pending,
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

// =============================================================================
// Unit Tests
// =============================================================================
