//! # Settings Repository
//!
//! The shop's [`PosSettings`], stored as one JSON document. A database that
//! has never been configured reads as the defaults.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use kassa_core::PosSettings;

use super::{decode_json, encode_json};
use crate::coordinator::{within, LedgerOptions};
use crate::error::DbResult;

/// Repository for POS settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
    ledger: LedgerOptions,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool, ledger: LedgerOptions) -> Self {
        SettingsRepository { pool, ledger }
    }

    /// Loads the settings, or the defaults when none are stored.
    pub async fn load(&self) -> DbResult<PosSettings> {
        within("load_settings", self.ledger.deadlines.short, async {
            let params: Option<String> =
                sqlx::query_scalar("SELECT params FROM pos_settings WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;

            match params {
                Some(raw) => decode_json("pos_settings.params", &raw),
                None => {
                    debug!("No stored POS settings, using defaults");
                    Ok(PosSettings::default())
                }
            }
        })
        .await
    }

    /// Replaces the stored settings.
    pub async fn save(&self, settings: &PosSettings) -> DbResult<()> {
        let params = encode_json("pos_settings.params", settings)?;

        within("save_settings", self.ledger.deadlines.short, async {
            sqlx::query(
                r#"
                INSERT INTO pos_settings (id, params, updated_at) VALUES (1, ?1, ?2)
                ON CONFLICT (id) DO UPDATE SET params = excluded.params, updated_at = excluded.updated_at
                "#,
            )
            .bind(&params)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

            info!("POS settings saved");
            Ok(())
        })
        .await
    }
}
