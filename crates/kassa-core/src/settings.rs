//! # POS Settings
//!
//! Typed configuration for a shop. Stored as one JSON document; every field
//! has a default so older documents keep loading as fields are added.

use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Shop-wide point of sale settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosSettings {
    /// Minimum loyalty points before redemption is allowed.
    pub min_redeem: i64,
    /// Loyalty points earned per unit of currency.
    pub points: f64,
    pub price_tag: bool,
    #[serde(alias = "red_perc")]
    pub points_redemption_rate: f64,
    pub redeem: bool,
    /// Drawer cash at which a cash rollup is demanded before the next bill.
    pub rollup: Money,
    pub allow_product_search: bool,
    /// Completed orders wait in `ordered` until production dispatches them.
    pub production_dispatch: bool,
    pub allow_negative_sale: bool,
    /// Opening a till needs a supervisor token.
    pub approve_sales: bool,
    pub allow_suspend: bool,
    pub has_categories: bool,
    /// Minutes an approval token stays valid.
    pub auth_validity: i64,
    /// Minutes a mobile payment reference stays claimable.
    pub mpesa_expiry: i64,
    pub manual_add_mpesa: bool,
}

impl Default for PosSettings {
    fn default() -> Self {
        PosSettings {
            min_redeem: 0,
            points: 0.0,
            price_tag: false,
            points_redemption_rate: 0.0,
            redeem: false,
            rollup: Money::zero(),
            allow_product_search: true,
            production_dispatch: false,
            allow_negative_sale: false,
            approve_sales: false,
            allow_suspend: true,
            has_categories: false,
            auth_validity: 5,
            mpesa_expiry: 30,
            manual_add_mpesa: false,
        }
    }
}

impl PosSettings {
    /// True when the drawer holds at least the rollup threshold.
    ///
    /// A zero threshold disables the check.
    pub fn requires_rollup(&self, cash_in_till: Money) -> bool {
        self.rollup.is_positive() && self.rollup <= cash_in_till
    }
}
