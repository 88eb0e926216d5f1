//! Till service: drawer sessions and the cash that moves through them.

use std::sync::Arc;

use chrono::Utc;
use kassa_core::identity::authorize_till_open;
use kassa_core::{Capability, CashSummary, Identity, Money, Till};
use kassa_db::{AccountPayment, CashMovement, OpenTillRequest};
use serde::Deserialize;
use tracing::info;

use super::{reply, till_of};
use crate::error::{ApiResult, Reply};
use crate::AppState;

const SALES_OR_PAYMENT: [Capability; 2] = [Capability::MakeSales, Capability::AcceptPayment];

/// A till-open request as the teller submits it.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTillInput {
    /// Supervisor approving the opening
    pub approver: String,
    /// The supervisor's current approval token
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub open_float: Money,
}

/// Till service implementation.
pub struct TillsService {
    state: Arc<AppState>,
}

impl TillsService {
    pub fn new(state: Arc<AppState>) -> Self {
        TillsService { state }
    }

    /// Opens a till for the caller, or returns the one already open.
    ///
    /// With `approve_sales` enabled the approver's rights and token are
    /// checked against the user service first.
    pub async fn open_till(&self, identity: &Identity, input: &OpenTillInput) -> Reply<Till> {
        let result: ApiResult<Till> = async {
            identity.require_any(&SALES_OR_PAYMENT)?;

            let settings = self.state.settings.load().await?;
            if settings.approve_sales {
                let approver = self.state.remote.directory.approver(&input.approver).await?;
                authorize_till_open(identity, &approver, &input.token, &settings, Utc::now())?;
            }

            let request = OpenTillRequest {
                teller: identity.username.clone(),
                supervisor: input.approver.clone(),
                branch: identity.branch.clone(),
                company_id: identity.company_id,
                open_float: input.open_float,
            };
            Ok(self
                .state
                .db
                .tills()
                .open_till(&request, self.state.remote.assigner.as_ref())
                .await?)
        }
        .await;
        reply("open_till", identity, result)
    }

    /// The caller's open till, if any.
    pub async fn current(&self, identity: &Identity) -> Reply<Option<Till>> {
        let result: ApiResult<Option<Till>> = async {
            identity.require_any(&SALES_OR_PAYMENT)?;
            Ok(self.state.db.tills().open_for(&identity.username).await?)
        }
        .await;
        reply("current_till", identity, result)
    }

    /// Cash the drawer should hold right now.
    pub async fn cash_in_till(&self, identity: &Identity, till_no: i64) -> Reply<Money> {
        let result: ApiResult<Money> = async {
            identity.require_any(&SALES_OR_PAYMENT)?;
            Ok(self.state.db.tills().cash_in_till(till_no).await?)
        }
        .await;
        reply("cash_in_till", identity, result)
    }

    /// Takes `amount` out of the drawer.
    pub async fn cash_rollup(
        &self,
        identity: &Identity,
        till_no: i64,
        amount: Money,
        approved_by: Option<&str>,
    ) -> Reply<CashMovement> {
        let result: ApiResult<CashMovement> = async {
            identity.require(Capability::CashRollups)?;
            Ok(self
                .state
                .db
                .cash()
                .record_cash_rollup(till_no, amount, &identity.username, approved_by)
                .await?)
        }
        .await;
        reply("cash_rollup", identity, result)
    }

    pub async fn movements(&self, identity: &Identity, till_no: i64) -> Reply<Vec<CashMovement>> {
        let result: ApiResult<Vec<CashMovement>> = async {
            identity.require(Capability::CashRollups)?;
            Ok(self.state.db.cash().movements(till_no).await?)
        }
        .await;
        reply("cash_movements", identity, result)
    }

    pub async fn summary(&self, identity: &Identity, till_no: i64) -> Reply<CashSummary> {
        let result: ApiResult<CashSummary> = async {
            identity.require(Capability::CashRollups)?;
            Ok(self.state.db.tills().cash_summary(till_no).await?)
        }
        .await;
        reply("cash_summary", identity, result)
    }

    /// Ends the session with the counted cash; the caller signs it off.
    pub async fn close_till(&self, identity: &Identity, till_no: i64, close_cash: Money) -> Reply<Till> {
        let result: ApiResult<Till> = async {
            identity.require(Capability::CashRollups)?;
            let till = self
                .state
                .db
                .tills()
                .close_till(till_no, close_cash, &identity.username)
                .await?;
            info!(till_no, supervisor = %identity.username, counted = %close_cash, "Till closed");
            Ok(till)
        }
        .await;
        reply("close_till", identity, result)
    }

    pub async fn amend_till(&self, identity: &Identity, till_no: i64, amount: Money, reason: &str) -> Reply<Till> {
        let result: ApiResult<Till> = async {
            identity.require(Capability::CashRollups)?;
            Ok(self
                .state
                .db
                .tills()
                .amend_till(till_no, amount, reason, &identity.username)
                .await?)
        }
        .await;
        reply("amend_till", identity, result)
    }

    pub async fn confirm_till(&self, identity: &Identity, till_no: i64, summary: &CashSummary) -> Reply<Till> {
        let result: ApiResult<Till> = async {
            identity.require(Capability::CashRollups)?;
            Ok(self
                .state
                .db
                .tills()
                .confirm_till(till_no, &identity.username, summary)
                .await?)
        }
        .await;
        reply("confirm_till", identity, result)
    }

    /// A laybye instalment taken at the caller's till.
    pub async fn laybye_payment(
        &self,
        identity: &Identity,
        laybye_id: i64,
        pay_type: &str,
        amount: Money,
    ) -> Reply<String> {
        let result: ApiResult<String> = async {
            identity.require(Capability::AcceptPayment)?;
            let till = till_of(identity)?;
            Ok(self
                .state
                .db
                .cash()
                .record_laybye_payment(laybye_id, till, pay_type, amount)
                .await?)
        }
        .await;
        reply("laybye_payment", identity, result)
    }

    /// A customer account settlement taken at the caller's till.
    pub async fn account_payment(&self, identity: &Identity, ac_num: &str, payment: &AccountPayment) -> Reply<String> {
        let result: ApiResult<String> = async {
            identity.require(Capability::AcceptPayment)?;
            let till = till_of(identity)?;
            Ok(self
                .state
                .db
                .cash()
                .record_account_payment(ac_num, till, payment)
                .await?)
        }
        .await;
        reply("account_payment", identity, result)
    }
}
