//! Capability-checked ledger services.
//!
//! | Right            | Operations                                         |
//! |------------------|----------------------------------------------------|
//! | `make_sales`     | receipts, orders, cart, bills                      |
//! | `accept_payment` | payment, laybye and account payments               |
//! | `approve_sales`  | void, cascade delete                               |
//! | `cash_rollups`   | rollups, close / amend / confirm till              |
//! | either of the first two | open till, cash in till                     |

pub mod orders;
pub mod receipts;
pub mod tills;

pub use orders::{OrderCart, OrdersService};
pub use receipts::{CartView, PaymentRequest, ReceiptsService};
pub use tills::{OpenTillInput, TillsService};

use kassa_core::{CoreError, Identity};
use tracing::warn;

use crate::error::{ApiResult, Reply};

/// The caller's till, or `TillRequired` when none is open.
fn till_of(identity: &Identity) -> ApiResult<i64> {
    if identity.till_num <= 0 {
        return Err(CoreError::TillRequired.into());
    }
    Ok(identity.till_num)
}

/// Wraps a service result, logging rejections.
fn reply<T>(operation: &'static str, identity: &Identity, result: ApiResult<T>) -> Reply<T> {
    if let Err(err) = &result {
        warn!(
            operation,
            user = %identity.username,
            code = ?err.code,
            message = %err.message,
            "Request rejected"
        );
    }
    Reply::from(result)
}
