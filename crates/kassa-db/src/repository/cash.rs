//! # Cash Repository
//!
//! Money that moves through a drawer outside of a bill: cash rollups taken
//! out by a supervisor, laybye instalments and account settlements taken in.
//! These rows feed [`TillRepository::cash_in_till`](super::till::TillRepository::cash_in_till).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;
use uuid::Uuid;

use kassa_core::validation::{validate_person, validate_till};
use kassa_core::{Money, ValidationError};

use crate::coordinator::{settle, within, LedgerOptions};
use crate::error::{DbError, DbResult};

/// Movement type of cash taken out of a drawer for banking.
pub const CASH_ROLLUP: &str = "cash rollup";

/// A recorded drawer movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CashMovement {
    pub id: String,
    pub till_num: i64,
    pub movement_type: String,
    pub amount: Money,
    pub recorded_by: String,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Tender breakdown of an account settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AccountPayment {
    pub cash: Money,
    pub mpesa: Money,
    pub ecard: Money,
    pub cheque: Money,
}

fn positive(field: &str, amount: Money) -> DbResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Repository for drawer movements.
#[derive(Debug, Clone)]
pub struct CashRepository {
    pool: SqlitePool,
    ledger: LedgerOptions,
}

impl CashRepository {
    /// Creates a new CashRepository.
    pub fn new(pool: SqlitePool, ledger: LedgerOptions) -> Self {
        CashRepository { pool, ledger }
    }

    /// Records cash removed from an open till and adds it to the till's
    /// cash-outs, in one transaction.
    pub async fn record_cash_rollup(
        &self,
        till_num: i64,
        amount: Money,
        recorded_by: &str,
        approved_by: Option<&str>,
    ) -> DbResult<CashMovement> {
        validate_till(till_num)?;
        validate_person("recorded_by", recorded_by)?;
        positive("amount", amount)?;

        within("record_cash_rollup", self.ledger.deadlines.short, async {
            let mut tx = self.pool.begin().await?;
            let result: DbResult<CashMovement> = async {
                let open: Option<Option<DateTime<Utc>>> =
                    sqlx::query_scalar("SELECT close_time FROM tills WHERE till_no = ?1")
                        .bind(till_num)
                        .fetch_optional(&mut *tx)
                        .await?;
                match open {
                    None => return Err(DbError::not_found("Till", till_num)),
                    Some(Some(_)) => return Err(DbError::conflict("Till", till_num, "till is closed")),
                    Some(None) => {}
                }

                let movement = CashMovement {
                    id: Uuid::new_v4().to_string(),
                    till_num,
                    movement_type: CASH_ROLLUP.to_string(),
                    amount,
                    recorded_by: recorded_by.to_string(),
                    approved_by: approved_by.map(str::to_string),
                    created_at: Utc::now(),
                };

                sqlx::query(
                    r#"
                    INSERT INTO cash_movements (
                        id, till_num, movement_type, amount, recorded_by, approved_by, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                )
                .bind(&movement.id)
                .bind(movement.till_num)
                .bind(&movement.movement_type)
                .bind(movement.amount)
                .bind(&movement.recorded_by)
                .bind(&movement.approved_by)
                .bind(movement.created_at)
                .execute(&mut *tx)
                .await?;

                sqlx::query("UPDATE tills SET cash_outs = cash_outs + ?1 WHERE till_no = ?2")
                    .bind(amount)
                    .bind(till_num)
                    .execute(&mut *tx)
                    .await?;

                info!(till_num, amount = %amount, recorded_by, "Cash rollup recorded");
                Ok(movement)
            }
            .await;
            settle(tx, result, "record_cash_rollup").await
        })
        .await
    }

    /// Drawer movements of a till, oldest first.
    pub async fn movements(&self, till_num: i64) -> DbResult<Vec<CashMovement>> {
        within("cash_movements", self.ledger.deadlines.short, async {
            let movements = sqlx::query_as::<_, CashMovement>(
                r#"
                SELECT id, till_num, movement_type, amount, recorded_by, approved_by, created_at
                FROM cash_movements
                WHERE till_num = ?1
                ORDER BY created_at
                "#,
            )
            .bind(till_num)
            .fetch_all(&self.pool)
            .await?;
            Ok(movements)
        })
        .await
    }

    /// Records a laybye instalment. Only `pay_type = "cash"` counts towards
    /// the drawer.
    pub async fn record_laybye_payment(
        &self,
        laybye_id: i64,
        till_num: i64,
        pay_type: &str,
        amount: Money,
    ) -> DbResult<String> {
        validate_till(till_num)?;
        positive("amount", amount)?;
        if pay_type.trim().is_empty() {
            return Err(ValidationError::required("pay_type").into());
        }

        within("record_laybye_payment", self.ledger.deadlines.short, async {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO laybye_payments (id, laybye_id, till_num, pay_type, amount_paid, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&id)
            .bind(laybye_id)
            .bind(till_num)
            .bind(pay_type)
            .bind(amount)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

            info!(laybye_id, till_num, pay_type, amount = %amount, "Laybye payment recorded");
            Ok(id)
        })
        .await
    }

    /// Records a customer account settlement taken at a till.
    pub async fn record_account_payment(
        &self,
        ac_num: &str,
        till_num: i64,
        payment: &AccountPayment,
    ) -> DbResult<String> {
        validate_till(till_num)?;
        if ac_num.trim().is_empty() {
            return Err(ValidationError::required("ac_num").into());
        }
        positive("amount", payment.cash + payment.mpesa + payment.ecard + payment.cheque)?;

        within("record_account_payment", self.ledger.deadlines.short, async {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO account_payments (
                    id, ac_num, till_num, cash_paid, mpesa_paid, ecard_paid, cheque_paid, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&id)
            .bind(ac_num)
            .bind(till_num)
            .bind(payment.cash)
            .bind(payment.mpesa)
            .bind(payment.ecard)
            .bind(payment.cheque)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

            info!(ac_num, till_num, "Account payment recorded");
            Ok(id)
        })
        .await
    }
}
