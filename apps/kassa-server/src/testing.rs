//! In-memory remote services and a ready-made state for service tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use kassa_core::{
    ApproverProfile, Capabilities, Catalog, CatalogItem, CoreError, CoreResult, Identity, Money,
    PosSettings, TillAssigner, UserDirectory,
};
use kassa_db::{Database, DbConfig, OpenTillRequest};

use crate::config::ServerConfig;
use crate::remote::RemoteClients;
use crate::AppState;

pub const APPROVER_TOKEN: &str = "4821";
pub const BROKEN_CODE: &str = "BROKEN";
pub const FAILING_TELLER: &str = "offline";

pub struct FakeDirectory;

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn approver(&self, username: &str) -> CoreResult<ApproverProfile> {
        if username != "otieno" {
            return Err(CoreError::upstream("user", format!("no such user {}", username)));
        }
        Ok(ApproverProfile {
            username: username.to_string(),
            cash_rollups: true,
            token: APPROVER_TOKEN.to_string(),
            token_expires: Utc::now() + Duration::minutes(10),
        })
    }
}

#[derive(Default)]
pub struct FakeAssigner {
    calls: Mutex<Vec<(String, i64)>>,
}

impl FakeAssigner {
    pub fn assigned_to(&self, teller: &str) -> Vec<i64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == teller)
            .map(|(_, till)| *till)
            .collect()
    }
}

#[async_trait]
impl TillAssigner for FakeAssigner {
    async fn assign(&self, teller: &str, till_no: i64) -> CoreResult<()> {
        if teller == FAILING_TELLER {
            return Err(CoreError::upstream("user", "UpdateTill refused"));
        }
        self.calls.lock().unwrap().push((teller.to_string(), till_no));
        Ok(())
    }
}

pub struct FakeCatalog;

fn product(code: &str, name: &str, price_cents: i64) -> CatalogItem {
    CatalogItem {
        item_code: code.to_string(),
        item_name: name.to_string(),
        item_cost: Money::from_cents(price_cents * 4 / 5),
        till_price: Money::from_cents(price_cents),
        vat_alpha: "A".to_string(),
        vat_percent: 16.0,
        on_offer: false,
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn lookup(&self, item_code: &str) -> CoreResult<CatalogItem> {
        match item_code {
            "SKU1" => Ok(product("SKU1", "Maize flour 2kg", 5000)),
            "SKU2" => Ok(product("SKU2", "Cooking oil 500ml", 2500)),
            "FREE" => Ok(product("FREE", "Carrier bag", 0)),
            BROKEN_CODE => Err(CoreError::upstream("inventory", "connection reset")),
            _ => Err(CoreError::not_found("Product", item_code)),
        }
    }
}

/// State plus two callers: a cashier on an open till and a supervisor.
pub struct Fixture {
    pub state: Arc<AppState>,
    pub assigner: Arc<FakeAssigner>,
    pub cashier: Identity,
    pub supervisor: Identity,
}

pub async fn fixture() -> Fixture {
    fixture_with(PosSettings::default()).await
}

pub async fn fixture_with(settings: PosSettings) -> Fixture {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.settings().save(&settings).await.unwrap();

    let assigner = Arc::new(FakeAssigner::default());
    let remote = RemoteClients {
        directory: Arc::new(FakeDirectory),
        assigner: assigner.clone(),
        catalog: Arc::new(FakeCatalog),
    };

    let till = db
        .tills()
        .open_till(
            &OpenTillRequest {
                teller: "amina".to_string(),
                supervisor: "otieno".to_string(),
                branch: "Westlands".to_string(),
                company_id: 1,
                open_float: Money::from_cents(500_000),
            },
            assigner.as_ref(),
        )
        .await
        .unwrap();

    let mut config = ServerConfig::default();
    config.auth.jwt_secret = "kassa-test-secret".to_string();
    let state = Arc::new(AppState::new(db, remote, None, config));

    let cashier = Identity {
        username: "amina".to_string(),
        branch: "Westlands".to_string(),
        branch_id: 2,
        company_id: 1,
        till_num: till.till_no,
        capabilities: Capabilities {
            make_sales: true,
            accept_payment: true,
            ..Default::default()
        },
    };
    let supervisor = Identity {
        username: "otieno".to_string(),
        capabilities: Capabilities {
            make_sales: true,
            accept_payment: true,
            cash_rollups: true,
            approve_sales: true,
        },
        ..cashier.clone()
    };

    Fixture {
        state,
        assigner,
        cashier,
        supervisor,
    }
}
