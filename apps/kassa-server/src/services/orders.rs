//! Order service: ringing up, completing and routing orders.

use std::sync::Arc;

use chrono::Utc;
use kassa_core::validation::{validate_catalog_item, validate_quantity};
use kassa_core::{cart, Capability, Identity, LineItem, Money, Order, OrderSummary, ValidationError, VoucherLine};
use serde::Serialize;
use tracing::info;

use super::{reply, till_of};
use crate::error::{ApiResult, Reply};
use crate::AppState;

/// An order's lines after an edit.
#[derive(Debug, Clone, Serialize)]
pub struct OrderCart {
    pub order_num: i64,
    pub items: Vec<LineItem>,
    pub total: Money,
}

/// Order service implementation.
pub struct OrdersService {
    state: Arc<AppState>,
}

impl OrdersService {
    pub fn new(state: Arc<AppState>) -> Self {
        OrdersService { state }
    }

    /// Opens an order on `receipt_num`, or returns the caller's open one.
    pub async fn new_order(&self, identity: &Identity, receipt_num: i64, ac_num: Option<&str>) -> Reply<i64> {
        let result: ApiResult<i64> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self
                .state
                .db
                .orders()
                .new_order(&identity.poster(), receipt_num, ac_num)
                .await?)
        }
        .await;
        reply("new_order", identity, result)
    }

    /// Resolves `item_code` through the catalog and appends the line.
    pub async fn add_item(
        &self,
        identity: &Identity,
        order_num: i64,
        item_code: &str,
        quantity: f64,
    ) -> Reply<OrderCart> {
        let result: ApiResult<OrderCart> = async {
            identity.require(Capability::MakeSales)?;
            if item_code.trim().is_empty() {
                return Err(ValidationError::required("item_code").into());
            }
            validate_quantity(quantity)?;

            let product = self.state.remote.catalog.lookup(item_code.trim()).await?;
            validate_catalog_item(&product)?;

            let line = cart::scan(&identity.poster(), &product, quantity, Utc::now());
            let (items, total) = self.state.db.orders().add_to_order(order_num, line).await?;
            Ok(OrderCart {
                order_num,
                items,
                total,
            })
        }
        .await;
        reply("add_item", identity, result)
    }

    /// Removes a line by key; removing it twice is not an error.
    pub async fn delete_item(&self, identity: &Identity, order_num: i64, key: &str) -> Reply<OrderCart> {
        let result: ApiResult<OrderCart> = async {
            identity.require(Capability::MakeSales)?;
            let (items, total) = self.state.db.orders().del_order_item(key, order_num).await?;
            Ok(OrderCart {
                order_num,
                items,
                total,
            })
        }
        .await;
        reply("delete_item", identity, result)
    }

    /// Completes the order and returns its voucher.
    pub async fn complete(&self, identity: &Identity, order_num: i64) -> Reply<Vec<VoucherLine>> {
        let result: ApiResult<Vec<VoucherLine>> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.orders().complete_order(order_num).await?)
        }
        .await;
        reply("complete_order", identity, result)
    }

    /// Production hands an `ordered` order over for billing.
    pub async fn dispatch(&self, identity: &Identity, order_num: i64) -> Reply<Order> {
        let result: ApiResult<Order> = async {
            identity.require(Capability::MakeSales)?;
            let order = self
                .state
                .db
                .orders()
                .dispatch_order(order_num, &identity.username)
                .await?;
            info!(order_num, dispatcher = %identity.username, "Order dispatched");
            Ok(order)
        }
        .await;
        reply("dispatch_order", identity, result)
    }

    /// Marks a dispatched order as being paid on `receipt_num`.
    pub async fn set_paying(&self, identity: &Identity, order_num: i64, receipt_num: i64) -> Reply<()> {
        let result: ApiResult<()> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.orders().set_order_pay(order_num, receipt_num).await?)
        }
        .await;
        reply("set_order_pay", identity, result)
    }

    pub async fn move_to_receipt(&self, identity: &Identity, order_num: i64, receipt_num: i64) -> Reply<Order> {
        let result: ApiResult<Order> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.orders().move_to_receipt(order_num, receipt_num).await?)
        }
        .await;
        reply("move_to_receipt", identity, result)
    }

    /// Open orders on the caller's till.
    pub async fn active(&self, identity: &Identity) -> Reply<Vec<OrderSummary>> {
        let result: ApiResult<Vec<OrderSummary>> = async {
            identity.require(Capability::MakeSales)?;
            let till = till_of(identity)?;
            Ok(self.state.db.orders().active_orders(till).await?)
        }
        .await;
        reply("active_orders", identity, result)
    }

    pub async fn voucher(&self, identity: &Identity, order_num: i64) -> Reply<Vec<VoucherLine>> {
        let result: ApiResult<Vec<VoucherLine>> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.orders().voucher(order_num).await?)
        }
        .await;
        reply("voucher", identity, result)
    }
}
