//! End-to-end ledger flows against an in-memory database.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use kassa_core::{
    CoreResult, LineItem, Money, OrderState, PayDetails, Poster, ReceiptState, SaleType,
    TillAssigner,
};
use kassa_db::{Database, DbConfig, DbError, OpenTillRequest, Tender, VoidOutcome};

struct Accepting;

#[async_trait]
impl TillAssigner for Accepting {
    async fn assign(&self, _teller: &str, _till_no: i64) -> CoreResult<()> {
        Ok(())
    }
}

async fn database() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

async fn open_till(db: &Database, teller: &str) -> i64 {
    let request = OpenTillRequest {
        teller: teller.to_string(),
        supervisor: "otieno".to_string(),
        branch: "Westlands".to_string(),
        company_id: 1,
        open_float: Money::from_cents(500_000),
    };
    db.tills().open_till(&request, &Accepting).await.unwrap().till_no
}

fn poster(till_num: i64) -> Poster {
    poster_at(till_num, "Westlands", 2)
}

fn poster_at(till_num: i64, branch: &str, branch_id: i64) -> Poster {
    Poster {
        username: "amina".to_string(),
        branch: branch.to_string(),
        branch_id,
        company_id: 1,
        till_num,
        accepts_payment: true,
    }
}

fn line(code: &str, price_cents: i64, quantity: f64) -> LineItem {
    LineItem {
        trans_date: Utc::now(),
        order_num: 0,
        receipt_num: 0,
        till_num: 0,
        served_by: "amina".to_string(),
        branch: "Westlands".to_string(),
        company_id: 1,
        item_code: code.to_string(),
        item_name: format!("Item {}", code),
        quantity,
        cost: Money::zero(),
        price: Money::from_cents(price_cents),
        discount: Money::zero(),
        vat_alpha: String::new(),
        vat_perc: 0.0,
        vat: Money::zero(),
        sale_type: SaleType::CashSale,
        receipt_item: String::new(),
        approved_by: String::new(),
        state: Default::default(),
    }
}

/// Opens an order on `receipt_num`, rings up `lines` and completes it.
async fn ring_up(db: &Database, till: i64, receipt_num: i64, lines: &[(&str, i64, f64)]) -> i64 {
    let order_num = db.orders().new_order(&poster(till), receipt_num, None).await.unwrap();
    for (code, price, qty) in lines {
        db.orders()
            .add_to_order(order_num, line(code, *price, *qty))
            .await
            .unwrap();
    }
    db.orders().complete_order(order_num).await.unwrap();
    order_num
}

#[tokio::test]
async fn test_sale_from_till_open_to_drawer() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    assert_eq!(open_till(&db, "amina").await, till);

    let receipt_num = db.receipts().gen_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let order_num = ring_up(&db, till, receipt_num, &[("SKU1", 5000, 2.0)]).await;

    let bill = db.receipts().close_bill(receipt_num).await.unwrap();
    assert_eq!(bill.total, Money::from_cents(10000));
    assert_eq!(bill.state, ReceiptState::PendingPayment);
    assert_eq!(bill.orders_in_bill, 1);
    assert_eq!(db.orders().fetch(order_num).await.unwrap().state, OrderState::Paying);

    db.receipts().begin_payment(receipt_num).await.unwrap();
    let tender = Tender {
        pay_details: PayDetails {
            cash: Money::from_cents(12000),
            ..Default::default()
        },
        pay_till: till,
        approver: String::new(),
        outcome: ReceiptState::Posted,
    };
    let paid = db.receipts().post_payment(receipt_num, &tender).await.unwrap();
    assert_eq!(paid.change, Money::from_cents(2000));

    assert_eq!(db.tills().cash_in_till(till).await.unwrap(), Money::from_cents(10000));
    assert_eq!(db.tills().cash_summary(till).await.unwrap().cash, Money::from_cents(10000));

    // the paid bill is no longer reused
    let next = db.receipts().gen_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    assert_ne!(next, receipt_num);
}

#[tokio::test]
async fn test_merge_folds_sources_into_target() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let target = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let source = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();

    let kept = ring_up(&db, till, target, &[("SKU1", 5000, 1.0)]).await;
    let moved = ring_up(&db, till, source, &[("SKU2", 2500, 2.0)]).await;

    let merged = db.receipts().merge(target, &[source]).await.unwrap();
    assert_eq!(merged.state, ReceiptState::PendingPayment);
    assert_eq!(merged.total, Money::from_cents(10000));
    assert_eq!(merged.orders_in_bill, 2);

    let moved_order = db.orders().fetch(moved).await.unwrap();
    assert_eq!(moved_order.receipt_num, target);
    assert_eq!(moved_order.state, OrderState::Paying);
    assert_eq!(db.orders().fetch(kept).await.unwrap().state, OrderState::Paying);
    assert_eq!(
        db.receipts().fetch_all(source).await.unwrap().state,
        ReceiptState::Voided
    );
}

#[tokio::test]
async fn test_merge_of_several_bills_keeps_only_live_lines() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let target = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let first = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let second = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();

    // first bill: order a with one line rung up by mistake, then order b
    let a = db.orders().new_order(&poster(till), first, None).await.unwrap();
    db.orders().add_to_order(a, line("SKU1", 5000, 1.0)).await.unwrap();
    db.orders().add_to_order(a, line("SKU9", 100, 1.0)).await.unwrap();
    db.orders().del_order_item(&format!("{}-2", a), a).await.unwrap();
    db.orders().complete_order(a).await.unwrap();
    let b = ring_up(&db, till, first, &[("SKU2", 2500, 2.0)]).await;
    assert_ne!(a, b);

    let c = ring_up(&db, till, second, &[("SKU3", 1000, 3.0)]).await;

    let merged = db.receipts().merge(target, &[first, second]).await.unwrap();
    assert_eq!(merged.state, ReceiptState::PendingPayment);
    assert_eq!(merged.orders_in_bill, 3);
    assert_eq!(merged.total, Money::from_cents(13000));

    for source in [first, second] {
        assert_eq!(db.receipts().fetch_all(source).await.unwrap().state, ReceiptState::Voided);
    }
    for order_num in [a, b, c] {
        let order = db.orders().fetch(order_num).await.unwrap();
        assert_eq!(order.receipt_num, target);
        assert_eq!(order.state, OrderState::Paying);
    }

    let live = db.receipts().fetch(target).await.unwrap();
    let keys: HashSet<String> = live.cart.iter().map(|item| item.receipt_item.clone()).collect();
    let expected: HashSet<String> = [format!("{}-1", a), format!("{}-1", b), format!("{}-1", c)]
        .into_iter()
        .collect();
    assert_eq!(keys, expected);
    assert_eq!(live.cart.len(), 3);
    assert_eq!(live.total, Money::from_cents(13000));

    // the deleted line stays on the stored bill for audit
    let stored = db.receipts().fetch_all(target).await.unwrap();
    assert_eq!(stored.cart.len(), 4);
    assert!(stored
        .cart
        .iter()
        .any(|item| item.receipt_item == format!("{}-2", a) && !item.is_pending()));
}

#[tokio::test]
async fn test_voided_bill_cannot_be_merged() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let target = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let voided = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let order_num = ring_up(&db, till, voided, &[("SKU1", 7000, 1.0)]).await;
    db.receipts().void(voided).await.unwrap();

    let err = db.receipts().merge(target, &[voided]).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }), "{}", err);

    let order = db.orders().fetch(order_num).await.unwrap();
    assert_eq!(order.receipt_num, voided);
    assert_ne!(order.state, OrderState::Paying);
    let target_receipt = db.receipts().fetch_all(target).await.unwrap();
    assert_eq!(target_receipt.state, ReceiptState::Pending);
    assert!(target_receipt.total.is_zero());
}

#[tokio::test]
async fn test_failed_merge_leaves_everything_untouched() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let target = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let source = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let moved = ring_up(&db, till, source, &[("SKU2", 2500, 2.0)]).await;

    sqlx::query(
        r#"
        CREATE TRIGGER refuse_void BEFORE UPDATE OF state ON receipts
        WHEN NEW.state = 'VOIDED'
        BEGIN
            SELECT RAISE(ABORT, 'forced failure');
        END
        "#,
    )
    .execute(db.pool())
    .await
    .unwrap();

    let err = db.receipts().merge(target, &[source]).await.unwrap_err();
    assert!(err.to_string().contains("forced failure"), "{}", err);

    let order = db.orders().fetch(moved).await.unwrap();
    assert_eq!(order.receipt_num, source);
    assert_eq!(order.state, OrderState::Dispatched);
    assert_eq!(db.receipts().fetch_all(source).await.unwrap().state, ReceiptState::Pending);

    let target_receipt = db.receipts().fetch_all(target).await.unwrap();
    assert_eq!(target_receipt.state, ReceiptState::Pending);
    assert!(target_receipt.cart.is_empty());
}

#[tokio::test]
async fn test_paid_receipts_cannot_be_voided_or_merged() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let receipt_num = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    ring_up(&db, till, receipt_num, &[("SKU1", 5000, 1.0)]).await;
    db.receipts().close_bill(receipt_num).await.unwrap();

    let tender = Tender {
        pay_details: PayDetails {
            cash: Money::from_cents(5000),
            ..Default::default()
        },
        pay_till: till,
        approver: "otieno".to_string(),
        outcome: ReceiptState::Paid,
    };
    db.receipts().post_payment(receipt_num, &tender).await.unwrap();

    let err = db.receipts().void(receipt_num).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));
    let err = db.receipts().del_cascade(receipt_num).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));

    let target = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let err = db.receipts().merge(target, &[receipt_num]).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));
    assert_eq!(
        db.receipts().fetch_all(receipt_num).await.unwrap().state,
        ReceiptState::Paid
    );
}

#[tokio::test]
async fn test_voiding_twice_is_quiet() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let receipt_num = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();

    assert_eq!(db.receipts().void(receipt_num).await.unwrap(), VoidOutcome::Voided);
    assert_eq!(
        db.receipts().del_cascade(receipt_num).await.unwrap(),
        VoidOutcome::AlreadyVoided
    );
}

#[tokio::test]
async fn test_lines_of_completed_orders_are_locked() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let receipt_num = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let order_num = ring_up(&db, till, receipt_num, &[("SKU1", 5000, 1.0)]).await;

    let key = format!("{}-1", order_num);
    let err = db.orders().del_order_item(&key, order_num).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));

    let items = db.orders().fetch_items(order_num).await.unwrap();
    assert!(items[0].is_pending());
}

#[tokio::test]
async fn test_close_resume_suspend_resume() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let receipt_num = db.receipts().gen_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    let order_num = ring_up(&db, till, receipt_num, &[("SKU1", 5000, 2.0)]).await;

    db.receipts().close_bill(receipt_num).await.unwrap();

    let resumed = db.receipts().resume(receipt_num).await.unwrap();
    assert_eq!(resumed.state, ReceiptState::Pending);
    assert_eq!(db.orders().fetch(order_num).await.unwrap().state, OrderState::Dispatched);

    assert_eq!(db.receipts().suspend(till).await.unwrap(), 1);
    assert_eq!(
        db.receipts().fetch_all(receipt_num).await.unwrap().state,
        ReceiptState::Suspended
    );

    let resumed = db.receipts().resume(receipt_num).await.unwrap();
    assert_eq!(resumed.state, ReceiptState::Pending);

    // closing again picks the same order back up
    let bill = db.receipts().close_bill(receipt_num).await.unwrap();
    assert_eq!(bill.total, Money::from_cents(10000));
    assert_eq!(bill.orders_in_bill, 1);
}

#[tokio::test]
async fn test_resume_rejects_paid_and_missing_receipts() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let receipt_num = db.receipts().create_receipt(&poster(till), SaleType::CashSale).await.unwrap();
    db.receipts().void(receipt_num).await.unwrap();

    let err = db.receipts().resume(receipt_num).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));
    let err = db.receipts().resume(7).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test]
async fn test_concurrent_orders_get_distinct_numbers() {
    let db = database().await;
    let till = open_till(&db, "amina").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let receipt_num = db
                .receipts()
                .create_receipt(&poster(till), SaleType::CashSale)
                .await
                .unwrap();
            db.orders().new_order(&poster(till), receipt_num, None).await.unwrap()
        }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        numbers.insert(handle.await.unwrap());
    }
    assert_eq!(numbers.len(), 8);
}

#[tokio::test]
async fn test_branches_of_one_company_never_share_order_numbers() {
    let db = database().await;
    let till = open_till(&db, "amina").await;
    let karen = poster_at(till, "Karen", 11);
    let westlands = poster_at(till, "Westlands", 1);

    let mut numbers = HashSet::new();
    for _ in 0..2 {
        let receipt_num = db.receipts().create_receipt(&karen, SaleType::CashSale).await.unwrap();
        numbers.insert(db.orders().new_order(&karen, receipt_num, None).await.unwrap());
    }
    for count in 1..=12 {
        let receipt_num = db.receipts().create_receipt(&westlands, SaleType::CashSale).await.unwrap();
        let order_num = db.orders().new_order(&westlands, receipt_num, None).await.unwrap();
        assert!(numbers.insert(order_num), "order {} reused", order_num);
        assert_eq!(db.orders().fetch(order_num).await.unwrap().daily_count, count);
    }
    assert_eq!(numbers.len(), 14);
}
