//! # kassa-server
//!
//! Bootstrap process and service facade for the sales ledger.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger Services                                 │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │ OrdersService  │  │ReceiptsService │  │  TillsService              ││
//! │  │                │  │                │  │                            ││
//! │  │ • NewOrder     │  │ • Cart         │  │ • OpenTill                 ││
//! │  │ • AddItem      │  │ • CloseBill    │  │ • CashInTill               ││
//! │  │ • DeleteItem   │  │ • Merge        │  │ • CashRollup               ││
//! │  │ • Complete     │  │ • Suspend      │  │ • Close / Amend / Confirm  ││
//! │  │ • Dispatch     │  │ • Resume       │  │ • Laybye / Account payment ││
//! │  │ • MoveToBill   │  │ • Void / Pay   │  │                            ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Infrastructure                               │  │
//! │  │                                                                   │  │
//! │  │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────────┐│  │
//! │  │  │  SQLite      │  │    Redis     │  │  gRPC remotes            ││  │
//! │  │  │  (kassa-db)  │  │  settings    │  │  user / till / inventory ││  │
//! │  │  └──────────────┘  └──────────────┘  └──────────────────────────┘│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every service method checks the caller's capabilities first and answers
//! with a [`Reply`], which keeps "forbidden" apart from "error".

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod remote;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

use kassa_db::Database;

// Re-exports
pub use auth::IdentityResolver;
pub use cache::{SettingsCache, SettingsProvider};
pub use config::ServerConfig;
pub use error::{ApiError, ErrorCode, Reply};
pub use remote::RemoteClients;
pub use services::{OrdersService, ReceiptsService, TillsService};

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub settings: SettingsProvider,
    pub remote: RemoteClients,
    pub identities: IdentityResolver,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        db: Database,
        remote: RemoteClients,
        cache: Option<SettingsCache>,
        config: ServerConfig,
    ) -> Self {
        AppState {
            settings: SettingsProvider::new(db.settings(), cache),
            identities: IdentityResolver::new(config.auth.jwt_secret.clone()),
            db,
            remote,
            config,
        }
    }
}
