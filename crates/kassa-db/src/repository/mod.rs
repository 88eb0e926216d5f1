//! # Repository Module
//!
//! Store operations for the sales ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who Owns Which Table                                 │
//! │                                                                         │
//! │  Service                                                               │
//! │       │  db.receipts().close_bill(receipt_num)                         │
//! │       ▼                                                                 │
//! │  ReceiptRepository ──► receipts, and the orders of its bills           │
//! │  OrderRepository   ──► orders                                          │
//! │  TillRepository    ──► tills, drawer reconciliation reads              │
//! │  CashRepository    ──► cash_movements, laybye/account payments         │
//! │  SettingsRepository──► pos_settings                                    │
//! │  ledger (internal) ──► sales_ledger rows written by payment steps      │
//! │                                                                         │
//! │  Steps that must commit together take `&mut SqliteConnection` so the   │
//! │  coordinator can run them inside one transaction.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`OrderRepository`](order::OrderRepository) - Order Engine
//! - [`ReceiptRepository`](receipt::ReceiptRepository) - Receipt Ledger
//! - [`TillRepository`](till::TillRepository) - Till Register
//! - [`CashRepository`](cash::CashRepository) - Cash rollups and payments
//! - [`SettingsRepository`](settings::SettingsRepository) - POS settings

pub mod cash;
pub mod ledger;
pub mod order;
pub mod receipt;
pub mod settings;
pub mod till;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, DbResult};

/// Decodes a JSON document column.
pub(crate) fn decode_json<T: DeserializeOwned>(column: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::corrupt(column, e))
}

/// Encodes a value for a JSON document column.
pub(crate) fn encode_json<T: Serialize>(column: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::corrupt(column, e))
}
