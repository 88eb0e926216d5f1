//! # Identity and Approval
//!
//! Who is calling, what they may do, and whether a till opening is approved.
//!
//! ## Till-Open Approval
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller.make_sales || caller.accept_payment ?                          │
//! │        │ no ──► Forbidden                                               │
//! │        ▼ yes                                                            │
//! │  settings.approve_sales ?                                              │
//! │        │ no ──► approved                                                │
//! │        ▼ yes                                                            │
//! │  approver.cash_rollups ?            no ──► ApproverLacksRights          │
//! │  presented token == approver.token ? no ──► TokenMismatch               │
//! │  now <= approver.token_expires ?    no ──► TokenExpired                 │
//! │        ▼                                                                │
//! │     approved                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ApprovalRejection, CoreError, CoreResult};
use crate::settings::PosSettings;

// =============================================================================
// Capabilities
// =============================================================================

/// Rights granted to a user by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Capabilities {
    pub make_sales: bool,
    pub accept_payment: bool,
    pub cash_rollups: bool,
    pub approve_sales: bool,
}

/// A single right, for error messages and checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    MakeSales,
    AcceptPayment,
    CashRollups,
    ApproveSales,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::MakeSales => "make_sales",
            Capability::AcceptPayment => "accept_payment",
            Capability::CashRollups => "cash_rollups",
            Capability::ApproveSales => "approve_sales",
        }
    }
}

impl Capabilities {
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::MakeSales => self.make_sales,
            Capability::AcceptPayment => self.accept_payment,
            Capability::CashRollups => self.cash_rollups,
            Capability::ApproveSales => self.approve_sales,
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// A resolved caller. The ledger trusts this mapping verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub branch: String,
    pub branch_id: i64,
    pub company_id: i64,
    /// `0` when the user is not attached to an open till.
    pub till_num: i64,
    pub capabilities: Capabilities,
}

impl Identity {
    /// Fails with `Forbidden` unless the caller holds `capability`.
    pub fn require(&self, capability: Capability) -> CoreResult<()> {
        if self.capabilities.has(capability) {
            return Ok(());
        }
        Err(CoreError::forbidden(format!(
            "{} does not have the {} right",
            self.username,
            capability.as_str()
        )))
    }

    /// Fails with `Forbidden` unless the caller holds at least one of `any`.
    pub fn require_any(&self, any: &[Capability]) -> CoreResult<()> {
        if any.iter().any(|c| self.capabilities.has(*c)) {
            return Ok(());
        }
        let names: Vec<&str> = any.iter().map(Capability::as_str).collect();
        Err(CoreError::forbidden(format!(
            "{} needs one of: {}",
            self.username,
            names.join(", ")
        )))
    }

    /// The slice of the identity that gets stamped on orders and receipts.
    pub fn poster(&self) -> Poster {
        Poster {
            username: self.username.clone(),
            branch: self.branch.clone(),
            branch_id: self.branch_id,
            company_id: self.company_id,
            till_num: self.till_num,
            accepts_payment: self.capabilities.accept_payment,
        }
    }
}

/// Attribution for newly created orders and receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poster {
    pub username: String,
    pub branch: String,
    pub branch_id: i64,
    pub company_id: i64,
    pub till_num: i64,
    /// When set, receipts this poster creates are payable at their till.
    pub accepts_payment: bool,
}

// =============================================================================
// Approval
// =============================================================================

/// The supervisor record an approval is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverProfile {
    pub username: String,
    pub cash_rollups: bool,
    pub token: String,
    pub token_expires: DateTime<Utc>,
}

/// Decides whether `caller` may open a till on `approver`'s say-so.
///
/// ## Example
/// ```rust
/// use chrono::{Duration, Utc};
/// use kassa_core::identity::{authorize_till_open, ApproverProfile, Capabilities, Identity};
/// use kassa_core::settings::PosSettings;
///
/// let caller = Identity {
///     username: "amina".into(),
///     branch: "Westlands".into(),
///     branch_id: 2,
///     company_id: 1,
///     till_num: 0,
///     capabilities: Capabilities { make_sales: true, ..Default::default() },
/// };
/// let approver = ApproverProfile {
///     username: "otieno".into(),
///     cash_rollups: true,
///     token: "4821".into(),
///     token_expires: Utc::now() + Duration::minutes(5),
/// };
/// let settings = PosSettings { approve_sales: true, ..Default::default() };
///
/// assert!(authorize_till_open(&caller, &approver, "4821", &settings, Utc::now()).is_ok());
/// ```
pub fn authorize_till_open(
    caller: &Identity,
    approver: &ApproverProfile,
    presented_token: &str,
    settings: &PosSettings,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    caller.require_any(&[Capability::MakeSales, Capability::AcceptPayment])?;

    if !settings.approve_sales {
        return Ok(());
    }

    let approver_name = approver.username.clone();
    if !approver.cash_rollups {
        return Err(ApprovalRejection::ApproverLacksRights {
            approver: approver_name,
        }
        .into());
    }
    if approver.token.is_empty() || approver.token != presented_token {
        return Err(ApprovalRejection::TokenMismatch {
            approver: approver_name,
        }
        .into());
    }
    if now > approver.token_expires {
        return Err(ApprovalRejection::TokenExpired {
            approver: approver_name,
        }
        .into());
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn caller(caps: Capabilities) -> Identity {
        Identity {
            username: "amina".into(),
            branch: "Westlands".into(),
            branch_id: 2,
            company_id: 1,
            till_num: 0,
            capabilities: caps,
        }
    }

    fn approver(now: DateTime<Utc>) -> ApproverProfile {
        ApproverProfile {
            username: "otieno".into(),
            cash_rollups: true,
            token: "4821".into(),
            token_expires: now + Duration::minutes(10),
        }
    }

    fn approval_on() -> PosSettings {
        PosSettings {
            approve_sales: true,
            ..Default::default()
        }
    }

    fn seller() -> Capabilities {
        Capabilities {
            make_sales: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_caller_without_rights_is_forbidden() {
        let now = Utc::now();
        let err = authorize_till_open(
            &caller(Capabilities::default()),
            &approver(now),
            "4821",
            &approval_on(),
            now,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[test]
    fn test_cashier_with_payment_right_may_open() {
        let now = Utc::now();
        let caps = Capabilities {
            accept_payment: true,
            ..Default::default()
        };
        assert!(authorize_till_open(&caller(caps), &approver(now), "", &PosSettings::default(), now).is_ok());
    }

    #[test]
    fn test_approval_disabled_skips_token_checks() {
        let now = Utc::now();
        let mut sup = approver(now);
        sup.cash_rollups = false;
        assert!(authorize_till_open(&caller(seller()), &sup, "wrong", &PosSettings::default(), now).is_ok());
    }

    #[test]
    fn test_approver_without_rollup_right() {
        let now = Utc::now();
        let mut sup = approver(now);
        sup.cash_rollups = false;
        let err = authorize_till_open(&caller(seller()), &sup, "4821", &approval_on(), now).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Approval(ApprovalRejection::ApproverLacksRights { .. })
        ));
    }

    #[test]
    fn test_token_mismatch() {
        let now = Utc::now();
        let err =
            authorize_till_open(&caller(seller()), &approver(now), "0000", &approval_on(), now).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Approval(ApprovalRejection::TokenMismatch { .. })
        ));
    }

    #[test]
    fn test_token_expired() {
        let now = Utc::now();
        let later = now + Duration::minutes(11);
        let err =
            authorize_till_open(&caller(seller()), &approver(now), "4821", &approval_on(), later).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Approval(ApprovalRejection::TokenExpired { .. })
        ));
    }

    #[test]
    fn test_require_messages_name_the_right() {
        let err = caller(seller()).require(Capability::CashRollups).unwrap_err();
        assert!(err.to_string().contains("cash_rollups"));
    }
}
