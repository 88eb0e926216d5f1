//! # Domain Types
//!
//! Records the ledger persists and the state machines that govern them.
//!
//! ## Lifecycles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ORDER                                                                  │
//! │  pending ──complete──► ordered ──dispatch──► dispatched                 │
//! │     │         (production dispatch on)           │                      │
//! │     └───────complete (production dispatch off)───┘                      │
//! │                                                  │                      │
//! │                         close bill / merge ──────▼                      │
//! │                                               paying ◄──┐               │
//! │                                                  │      │ resume        │
//! │                                                  └──────┘ (→dispatched) │
//! │  any non-terminal ──cascade──► DELETED                                  │
//! │                                                                         │
//! │  RECEIPT                                                                │
//! │  pending ──close bill──► pending payment ──begin──► paying              │
//! │     ▲  │                        │                      │                │
//! │     │  └──suspend──► suspend    │                      ▼                │
//! │     └──────resume───────────────┘      POSTED / PAID / DEBITED /        │
//! │                                        CREDITED / AWAITING RECEIPT      │
//! │  anything but a payment-terminal state ──void──► VOIDED                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Line Item State
// =============================================================================

/// State of a single cart line.
///
/// Deleted and voided lines stay in the cart document for audit but never
/// count toward a total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ItemState {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "DELETED")]
    Deleted,
    #[serde(rename = "VOIDED")]
    Voided,
}

// =============================================================================
// Order State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    /// Items are still being added.
    #[default]
    Pending,
    /// Completed and waiting on production dispatch.
    Ordered,
    /// Ready to be billed.
    Dispatched,
    /// Combined into a bill awaiting payment.
    Paying,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "DELETED"))]
    #[serde(rename = "DELETED")]
    Deleted,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "VOIDED"))]
    #[serde(rename = "VOIDED")]
    Voided,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "pending",
            OrderState::Ordered => "ordered",
            OrderState::Dispatched => "dispatched",
            OrderState::Paying => "paying",
            OrderState::Deleted => "DELETED",
            OrderState::Voided => "VOIDED",
        }
    }

    /// Deleted and voided orders never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Deleted | OrderState::Voided)
    }
}

// =============================================================================
// Receipt State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum ReceiptState {
    #[default]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "pending"))]
    #[serde(rename = "pending")]
    Pending,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "pending payment"))]
    #[serde(rename = "pending payment")]
    PendingPayment,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "paying"))]
    #[serde(rename = "paying")]
    Paying,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "suspend"))]
    #[serde(rename = "suspend")]
    Suspended,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "POSTED"))]
    #[serde(rename = "POSTED")]
    Posted,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "DEBITED"))]
    #[serde(rename = "DEBITED")]
    Debited,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "CREDITED"))]
    #[serde(rename = "CREDITED")]
    Credited,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "PAID"))]
    #[serde(rename = "PAID")]
    Paid,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "AWAITING RECEIPT"))]
    #[serde(rename = "AWAITING RECEIPT")]
    AwaitingReceipt,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "VOIDED"))]
    #[serde(rename = "VOIDED")]
    Voided,
}

impl ReceiptState {
    /// States reached once money has been taken. A receipt in one of these
    /// can never be voided.
    pub const PAYMENT_TERMINAL: [ReceiptState; 5] = [
        ReceiptState::Posted,
        ReceiptState::Debited,
        ReceiptState::Credited,
        ReceiptState::Paid,
        ReceiptState::AwaitingReceipt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptState::Pending => "pending",
            ReceiptState::PendingPayment => "pending payment",
            ReceiptState::Paying => "paying",
            ReceiptState::Suspended => "suspend",
            ReceiptState::Posted => "POSTED",
            ReceiptState::Debited => "DEBITED",
            ReceiptState::Credited => "CREDITED",
            ReceiptState::Paid => "PAID",
            ReceiptState::AwaitingReceipt => "AWAITING RECEIPT",
            ReceiptState::Voided => "VOIDED",
        }
    }

    pub fn is_payment_terminal(&self) -> bool {
        Self::PAYMENT_TERMINAL.contains(self)
    }

    /// The bill is still open for cart changes, closing or merging.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ReceiptState::Pending | ReceiptState::PendingPayment | ReceiptState::Paying
        )
    }
}

// =============================================================================
// Sale Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum SaleType {
    #[default]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Cash Sale"))]
    #[serde(rename = "Cash Sale")]
    CashSale,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Credit Sale"))]
    #[serde(rename = "Credit Sale")]
    CreditSale,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "Laybye"))]
    #[serde(rename = "Laybye")]
    Laybye,
}

// =============================================================================
// Line Item
// =============================================================================

/// A single scanned product within an order or a receipt cart.
///
/// Name, cost, price and VAT are snapshots taken at scan time; later catalog
/// changes never rewrite a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub trans_date: DateTime<Utc>,
    #[serde(default)]
    pub order_num: i64,
    #[serde(default)]
    pub receipt_num: i64,
    #[serde(default)]
    pub till_num: i64,
    pub served_by: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub company_id: i64,
    pub item_code: String,
    pub item_name: String,
    pub quantity: f64,
    #[serde(default)]
    pub cost: Money,
    pub price: Money,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub vat_alpha: String,
    #[serde(default)]
    pub vat_perc: f64,
    #[serde(default)]
    pub vat: Money,
    #[serde(default)]
    pub sale_type: SaleType,
    /// `"{order_num}-{position}"`, unique across the whole ledger.
    #[serde(default)]
    pub receipt_item: String,
    #[serde(default)]
    pub approved_by: String,
    #[serde(default)]
    pub state: ItemState,
}

impl LineItem {
    /// `price × quantity`, rounded once.
    pub fn line_total(&self) -> Money {
        self.price.times(self.quantity)
    }

    pub fn is_pending(&self) -> bool {
        self.state == ItemState::Pending
    }
}

// =============================================================================
// Order
// =============================================================================

/// A ticket of line items tied to a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_num: i64,
    pub daily_count: i64,
    pub trans_date: DateTime<Utc>,
    pub complete_time: Option<DateTime<Utc>>,
    pub items: Vec<LineItem>,
    pub poster: String,
    pub branch: String,
    pub company_id: i64,
    pub till_num: i64,
    pub pay_till: i64,
    pub receipt_num: i64,
    pub ac_num: String,
    pub state: OrderState,
    pub disp_by: Option<String>,
    pub disp_time: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

impl Order {
    /// Sum of pending line totals.
    pub fn total(&self) -> Money {
        crate::cart::cart_total(&self.items)
    }
}

/// Listing row for active orders on a till or bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_num: i64,
    pub receipt_num: i64,
    pub poster: String,
    pub state: OrderState,
    pub trans_date: DateTime<Utc>,
    pub total: Money,
}

// =============================================================================
// Receipt
// =============================================================================

/// Tendered amounts by payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PayDetails {
    pub cash: Money,
    pub mpesa: Money,
    pub ecard: Money,
    pub cheque: Money,
    pub voucher: Money,
    pub redeem: Money,
}

impl PayDetails {
    pub fn tendered(&self) -> Money {
        self.cash + self.mpesa + self.ecard + self.cheque + self.voucher + self.redeem
    }
}

/// Checkout timing metrics, all in seconds except `products_sold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Analysis {
    /// Seconds per unit scanned between the first and last scan.
    pub scan_rate: f64,
    /// Seconds from the last scan until now.
    pub pay_time: f64,
    /// Seconds from the first scan until now.
    pub time_on_sale: f64,
    pub products_sold: f64,
}

/// A customer bill and its cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLog {
    pub receipt_num: i64,
    pub trans_date: DateTime<Utc>,
    pub till_num: i64,
    pub pay_till: i64,
    pub company_id: i64,
    pub daily_count: i64,
    pub branch: String,
    pub poster: String,
    pub sale_type: SaleType,
    pub total: Money,
    pub cash: Money,
    pub change: Money,
    pub cart: Vec<LineItem>,
    pub pay_details: PayDetails,
    pub state: ReceiptState,
    pub approver: String,
    pub ac_num: Option<String>,
    pub laybye_id: i64,
    pub last_updated: DateTime<Utc>,
    pub orders_in_bill: i64,
    pub analysis: Option<Analysis>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

// =============================================================================
// Till
// =============================================================================

/// Totals per payment channel for a till session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CashSummary {
    pub cash: Money,
    pub mobile: Money,
    pub ecard: Money,
    pub cheque: Money,
    pub returns: Money,
    pub discount: Money,
}

/// A teller's cash-drawer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Till {
    pub till_no: i64,
    pub daily_id: i64,
    pub company_id: i64,
    pub open_time: DateTime<Utc>,
    pub open_float: Money,
    pub teller: String,
    pub supervisor: String,
    pub branch: String,
    pub cash_outs: Money,
    pub cash_summary: CashSummary,
    pub confirm_summary: CashSummary,
    pub close_time: Option<DateTime<Utc>>,
    pub close_cash: Option<Money>,
    pub close_supervisor: Option<String>,
    pub amend_time: Option<DateTime<Utc>>,
    pub amend_amount: Money,
    pub amend_reason: Option<String>,
    pub amend_supervisor: Option<String>,
    pub confirmed_by: Option<String>,
    pub confirmed: bool,
}

impl Till {
    pub fn is_open(&self) -> bool {
        self.close_time.is_none()
    }
}

// =============================================================================
// Voucher
// =============================================================================

/// One line of the printed order voucher: identical items at the same price
/// collapse into a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherLine {
    pub item_name: String,
    pub quantity: f64,
    pub price: Money,
    pub total: Money,
    pub order_num: i64,
    pub poster: String,
    /// `YYYY-MM-DD HH:MM`
    pub txn_time: String,
}

// =============================================================================
// Unit Tests
// =============================================================================
