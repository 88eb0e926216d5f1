//! Receipt service: bills from first scan to payment.

use std::sync::Arc;

use kassa_core::{
    cart, Analysis, Capability, CoreError, Identity, LineItem, Money, OrderSummary, PayDetails,
    PosSettings, ReceiptLog, ReceiptState, SaleType,
};
use kassa_db::{Tender, VoidOutcome};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{reply, till_of};
use crate::error::{ApiResult, Reply};
use crate::AppState;

/// What the till screen shows for a bill.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub receipt_num: i64,
    pub sale_type: SaleType,
    pub stage: ReceiptState,
    /// Live lines only
    pub cart: Vec<LineItem>,
    pub total: Money,
    pub orders: Vec<OrderSummary>,
    pub settings: PosSettings,
    /// The drawer must be rolled up before this bill is rung
    pub rollup: bool,
}

/// A tender as presented at the till.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub pay_details: PayDetails,
    pub outcome: ReceiptState,
    #[serde(default)]
    pub approver: String,
}

/// Receipt service implementation.
pub struct ReceiptsService {
    state: Arc<AppState>,
}

impl ReceiptsService {
    pub fn new(state: Arc<AppState>) -> Self {
        ReceiptsService { state }
    }

    /// Loads `receipt_num`, or the caller's current bill when `None`.
    ///
    /// A pending bill has no stored cart yet, so its lines are gathered from
    /// the orders billed on it.
    pub async fn cart(&self, identity: &Identity, receipt_num: Option<i64>, sale_type: SaleType) -> Reply<CartView> {
        let result: ApiResult<CartView> = async {
            identity.require(Capability::MakeSales)?;
            let till = till_of(identity)?;
            let receipts = self.state.db.receipts();

            let receipt_num = match receipt_num {
                Some(n) => n,
                None => receipts.gen_receipt(&identity.poster(), sale_type).await?,
            };

            let receipt = receipts.fetch(receipt_num).await?;
            let (lines, total) = if receipt.cart.is_empty() && receipt.state == ReceiptState::Pending {
                let lines = receipts.combine_orders_in_bill(receipt_num).await?;
                let total = cart::cart_total(&lines);
                (lines, total)
            } else {
                (receipt.cart, receipt.total)
            };

            let settings = self.state.settings.load().await?;
            let rollup = lines.is_empty()
                && settings.requires_rollup(self.state.db.tills().cash_in_till(till).await?);
            let orders = self.state.db.orders().active_orders_in_bill(receipt_num).await?;

            Ok(CartView {
                receipt_num,
                sale_type: receipt.sale_type,
                stage: receipt.state,
                cart: lines,
                total,
                orders,
                settings,
                rollup,
            })
        }
        .await;
        reply("cart", identity, result)
    }

    pub async fn close_bill(&self, identity: &Identity, receipt_num: i64) -> Reply<ReceiptLog> {
        let result: ApiResult<ReceiptLog> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.receipts().close_bill(receipt_num).await?)
        }
        .await;
        reply("close_bill", identity, result)
    }

    /// Folds `sources` into `target`; the sources are voided.
    pub async fn merge(&self, identity: &Identity, target: i64, sources: &[i64]) -> Reply<ReceiptLog> {
        let result: ApiResult<ReceiptLog> = async {
            identity.require(Capability::MakeSales)?;
            let merged = self.state.db.receipts().merge(target, sources).await?;
            info!(target, sources = ?sources, by = %identity.username, "Bills merged");
            Ok(merged)
        }
        .await;
        reply("merge", identity, result)
    }

    /// Parks the caller's pending bills.
    pub async fn suspend(&self, identity: &Identity) -> Reply<u64> {
        let result: ApiResult<u64> = async {
            identity.require(Capability::MakeSales)?;
            let till = till_of(identity)?;
            if !self.state.settings.load().await?.allow_suspend {
                return Err(CoreError::forbidden("suspending bills is disabled").into());
            }
            Ok(self.state.db.receipts().suspend(till).await?)
        }
        .await;
        reply("suspend", identity, result)
    }

    /// Parks whatever is on the till so a fresh bill can start.
    pub async fn new_bill(&self, identity: &Identity) -> Reply<u64> {
        let result: ApiResult<u64> = async {
            identity.require(Capability::MakeSales)?;
            let till = till_of(identity)?;
            Ok(self.state.db.receipts().new_bill(till).await?)
        }
        .await;
        reply("new_bill", identity, result)
    }

    pub async fn resume(&self, identity: &Identity, receipt_num: i64) -> Reply<ReceiptLog> {
        let result: ApiResult<ReceiptLog> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.receipts().resume(receipt_num).await?)
        }
        .await;
        reply("resume", identity, result)
    }

    /// Bills parked on the caller's till.
    pub async fn suspended(&self, identity: &Identity) -> Reply<Vec<ReceiptLog>> {
        let result: ApiResult<Vec<ReceiptLog>> = async {
            identity.require(Capability::MakeSales)?;
            let till = till_of(identity)?;
            Ok(self
                .state
                .db
                .receipts()
                .list_by_state(till, ReceiptState::Suspended)
                .await?)
        }
        .await;
        reply("suspended", identity, result)
    }

    pub async fn void(&self, identity: &Identity, receipt_num: i64) -> Reply<VoidOutcome> {
        let result: ApiResult<VoidOutcome> = async {
            identity.require(Capability::ApproveSales)?;
            let outcome = self.state.db.receipts().void(receipt_num).await?;
            info!(receipt_num, by = %identity.username, ?outcome, "Void requested");
            Ok(outcome)
        }
        .await;
        reply("void", identity, result)
    }

    /// Voids the bill and deletes every order on it.
    pub async fn del_cascade(&self, identity: &Identity, receipt_num: i64) -> Reply<VoidOutcome> {
        let result: ApiResult<VoidOutcome> = async {
            identity.require(Capability::ApproveSales)?;
            Ok(self.state.db.receipts().del_cascade(receipt_num).await?)
        }
        .await;
        reply("del_cascade", identity, result)
    }

    pub async fn analyze(&self, identity: &Identity, receipt_num: i64) -> Reply<Analysis> {
        let result: ApiResult<Analysis> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.receipts().analyze(receipt_num).await?)
        }
        .await;
        reply("analyze", identity, result)
    }

    pub async fn commit_sale(&self, identity: &Identity, receipt_num: i64) -> Reply<ReceiptLog> {
        let result: ApiResult<ReceiptLog> = async {
            identity.require(Capability::MakeSales)?;
            Ok(self.state.db.receipts().commit_sale(receipt_num).await?)
        }
        .await;
        reply("commit_sale", identity, result)
    }

    /// The cashier has the bill on the payment screen.
    pub async fn begin_payment(&self, identity: &Identity, receipt_num: i64) -> Reply<ReceiptLog> {
        let result: ApiResult<ReceiptLog> = async {
            identity.require(Capability::AcceptPayment)?;
            Ok(self.state.db.receipts().begin_payment(receipt_num).await?)
        }
        .await;
        reply("begin_payment", identity, result)
    }

    /// Settles the bill at the caller's till.
    pub async fn pay(&self, identity: &Identity, receipt_num: i64, request: &PaymentRequest) -> Reply<ReceiptLog> {
        let result: ApiResult<ReceiptLog> = async {
            identity.require(Capability::AcceptPayment)?;
            let tender = Tender {
                pay_details: request.pay_details,
                pay_till: till_of(identity)?,
                approver: request.approver.clone(),
                outcome: request.outcome,
            };
            Ok(self.state.db.receipts().post_payment(receipt_num, &tender).await?)
        }
        .await;
        reply("pay", identity, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, Outcome};
    use crate::services::OrdersService;
    use crate::testing::{self, Fixture};
    use kassa_core::Capabilities;

    /// Rings `quantity` of SKU1 (50.00) onto `receipt_num` and completes it.
    async fn ring(fx: &Fixture, receipt_num: i64, quantity: f64) {
        let orders = OrdersService::new(fx.state.clone());
        let order_num = orders.new_order(&fx.cashier, receipt_num, None).await.data.unwrap();
        orders.add_item(&fx.cashier, order_num, "SKU1", quantity).await;
        orders.complete(&fx.cashier, order_num).await;
    }

    /// The till's current bill with one completed order on it.
    async fn rung_bill(fx: &Fixture, quantity: f64) -> i64 {
        let receipts = ReceiptsService::new(fx.state.clone());
        let view = receipts.cart(&fx.cashier, None, SaleType::CashSale).await.data.unwrap();
        ring(fx, view.receipt_num, quantity).await;
        view.receipt_num
    }

    #[tokio::test]
    async fn test_cart_gathers_dispatched_orders() {
        let fx = testing::fixture().await;
        let receipt_num = rung_bill(&fx, 2.0).await;
        let service = ReceiptsService::new(fx.state.clone());

        let view = service
            .cart(&fx.cashier, Some(receipt_num), SaleType::CashSale)
            .await
            .data
            .unwrap();
        assert_eq!(view.stage, ReceiptState::Pending);
        assert_eq!(view.total, Money::from_cents(10000));
        assert_eq!(view.orders.len(), 1);
        assert!(!view.rollup);
    }

    #[tokio::test]
    async fn test_full_drawer_demands_rollup() {
        let fx = testing::fixture_with(PosSettings {
            rollup: Money::from_cents(8000),
            ..Default::default()
        })
        .await;
        let receipt_num = rung_bill(&fx, 2.0).await;
        let service = ReceiptsService::new(fx.state.clone());

        service.close_bill(&fx.cashier, receipt_num).await;
        let request = PaymentRequest {
            pay_details: PayDetails {
                cash: Money::from_cents(10000),
                ..Default::default()
            },
            outcome: ReceiptState::Posted,
            approver: String::new(),
        };
        assert!(service.pay(&fx.cashier, receipt_num, &request).await.is_success());

        let view = service.cart(&fx.cashier, None, SaleType::CashSale).await.data.unwrap();
        assert_ne!(view.receipt_num, receipt_num);
        assert!(view.cart.is_empty());
        assert!(view.rollup);
    }

    #[tokio::test]
    async fn test_cart_without_till_is_a_validation_error() {
        let fx = testing::fixture().await;
        let service = ReceiptsService::new(fx.state.clone());

        let mut roaming = fx.cashier.clone();
        roaming.till_num = 0;
        let reply = service.cart(&roaming, None, SaleType::CashSale).await;
        assert_eq!(reply.code, Some(ErrorCode::ValidationError));
    }

    #[tokio::test]
    async fn test_void_needs_approval_right() {
        let fx = testing::fixture().await;
        let receipt_num = rung_bill(&fx, 1.0).await;
        let service = ReceiptsService::new(fx.state.clone());

        let reply = service.void(&fx.cashier, receipt_num).await;
        assert_eq!(reply.response, Outcome::Forbidden);

        let reply = service.del_cascade(&fx.supervisor, receipt_num).await;
        assert_eq!(reply.data, Some(VoidOutcome::Voided));
        let reply = service.void(&fx.supervisor, receipt_num).await;
        assert_eq!(reply.data, Some(VoidOutcome::AlreadyVoided));
    }

    #[tokio::test]
    async fn test_payment_needs_payment_right() {
        let fx = testing::fixture().await;
        let receipt_num = rung_bill(&fx, 1.0).await;
        let service = ReceiptsService::new(fx.state.clone());
        service.close_bill(&fx.cashier, receipt_num).await;

        let mut waiter = fx.cashier.clone();
        waiter.capabilities = Capabilities {
            make_sales: true,
            ..Default::default()
        };
        let request = PaymentRequest {
            pay_details: PayDetails {
                mpesa: Money::from_cents(5000),
                ..Default::default()
            },
            outcome: ReceiptState::Posted,
            approver: String::new(),
        };
        assert_eq!(
            service.pay(&waiter, receipt_num, &request).await.response,
            Outcome::Forbidden
        );

        let paid = service.pay(&fx.cashier, receipt_num, &request).await.data.unwrap();
        assert_eq!(paid.state, ReceiptState::Posted);
        assert!(paid.change.is_zero());
    }

    #[tokio::test]
    async fn test_short_tender_is_rejected() {
        let fx = testing::fixture().await;
        let receipt_num = rung_bill(&fx, 2.0).await;
        let service = ReceiptsService::new(fx.state.clone());
        service.close_bill(&fx.cashier, receipt_num).await;
        service.begin_payment(&fx.cashier, receipt_num).await;

        let request = PaymentRequest {
            pay_details: PayDetails {
                cash: Money::from_cents(9999),
                ..Default::default()
            },
            outcome: ReceiptState::Posted,
            approver: String::new(),
        };
        let reply = service.pay(&fx.cashier, receipt_num, &request).await;
        assert_eq!(reply.code, Some(ErrorCode::ValidationError));

        let stored = fx.state.db.receipts().fetch_all(receipt_num).await.unwrap();
        assert_eq!(stored.state, ReceiptState::Paying);
    }

    #[tokio::test]
    async fn test_suspend_and_list() {
        let fx = testing::fixture().await;
        let receipt_num = rung_bill(&fx, 1.0).await;
        let service = ReceiptsService::new(fx.state.clone());

        // a rung but unclosed bill has no stored cart, so only new_bill parks it
        assert_eq!(service.suspend(&fx.cashier).await.data, Some(0));
        assert_eq!(service.new_bill(&fx.cashier).await.data, Some(1));

        let parked = service.suspended(&fx.cashier).await.data.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].receipt_num, receipt_num);

        let resumed = service.resume(&fx.cashier, receipt_num).await.data.unwrap();
        assert_eq!(resumed.state, ReceiptState::Pending);
    }

    #[tokio::test]
    async fn test_suspend_disabled_by_settings() {
        let fx = testing::fixture_with(PosSettings {
            allow_suspend: false,
            ..Default::default()
        })
        .await;
        let service = ReceiptsService::new(fx.state.clone());

        let reply = service.suspend(&fx.cashier).await;
        assert_eq!(reply.response, Outcome::Forbidden);
    }

    #[tokio::test]
    async fn test_merge_through_the_service() {
        let fx = testing::fixture().await;
        let target = rung_bill(&fx, 1.0).await;
        let source = fx
            .state
            .db
            .receipts()
            .create_receipt(&fx.cashier.poster(), SaleType::CashSale)
            .await
            .unwrap();
        ring(&fx, source, 3.0).await;

        let service = ReceiptsService::new(fx.state.clone());
        let merged = service.merge(&fx.cashier, target, &[source]).await.data.unwrap();
        assert_eq!(merged.total, Money::from_cents(4 * 5000));
        assert_eq!(merged.state, ReceiptState::PendingPayment);

        let reply = service.merge(&fx.cashier, target, &[target]).await;
        assert_eq!(reply.code, Some(ErrorCode::ValidationError));
    }
}
