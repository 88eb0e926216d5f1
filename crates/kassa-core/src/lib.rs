//! # kassa-core: Pure Ledger Logic
//!
//! Everything about orders, receipts and tills that can be decided without
//! I/O. The store layer calls into this crate for totals, numbering and
//! rules; the server calls into it for capability and approval checks.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 kassa-server (service facade)                   │   │
//! │  │    identity ─► capability check ─► ledger operation ─► reply    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kassa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   cart    │  │ numbering │  │ identity  │  │   │
//! │  │   │  Order    │  │  totals   │  │ order_num │  │ approval  │  │   │
//! │  │   │  Receipt  │  │  voucher  │  │ receipt   │  │ caps      │  │   │
//! │  │   │  Till     │  │  analyze  │  │ till_no   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kassa-db (Store Layer)                       │   │
//! │  │       SQLite, migrations, transaction coordinator, repos        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Orders, receipts, tills and their state machines
//! - [`money`] - Integer money
//! - [`cart`] - Totals, item keys, vouchers, checkout analysis
//! - [`numbering`] - Order, receipt and till number encoding
//! - [`identity`] - Capabilities and till-open approval
//! - [`settings`] - Typed POS settings
//! - [`ports`] - Traits for the remote identity, till and catalog services
//! - [`validation`] - Input checks
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod identity;
pub mod money;
pub mod numbering;
pub mod ports;
pub mod settings;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ApprovalRejection, CoreError, CoreResult, ErrorCategory, ValidationError};
pub use identity::{ApproverProfile, Capabilities, Capability, Identity, Poster};
pub use money::Money;
pub use ports::{Catalog, CatalogItem, TillAssigner, UserDirectory};
pub use settings::PosSettings;
pub use types::*;
