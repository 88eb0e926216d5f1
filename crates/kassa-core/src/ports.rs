//! # Remote Ports
//!
//! Contracts for the collaborators the ledger calls but does not own. The
//! server crate implements them over gRPC; tests implement them in memory.
//!
//! Every failure comes back as [`CoreError::Upstream`](crate::CoreError).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::identity::ApproverProfile;
use crate::money::Money;

/// Looks up user records held by the identity service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetches the approval-relevant profile of `username`.
    async fn approver(&self, username: &str) -> CoreResult<ApproverProfile>;
}

/// Tells the identity service which till a teller is now working.
#[async_trait]
pub trait TillAssigner: Send + Sync {
    async fn assign(&self, teller: &str, till_no: i64) -> CoreResult<()>;
}

/// A sellable product as the inventory service describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_code: String,
    pub item_name: String,
    #[serde(default)]
    pub item_cost: Money,
    #[serde(default)]
    pub till_price: Money,
    #[serde(default)]
    pub vat_alpha: String,
    #[serde(default)]
    pub vat_percent: f64,
    #[serde(default)]
    pub on_offer: bool,
}

/// Resolves item codes to catalog entries.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, item_code: &str) -> CoreResult<CatalogItem>;
}
